use std::fmt;

use serde::Deserialize;

use crate::allocation::AllocationStrategy;
use crate::cost::CostModelConfig;
use crate::error::{ensure_non_negative, DnmError, Result};
use crate::residual::ResidualMode;

pub const CONFIG_VERSION: u32 = 1;

/// Access-control model: how queue budgets are derived and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcModel {
    /// Multi-hop model: every queue gets a fixed token-bucket cap.
    Mhm,
    /// Threshold-based model: every queue gets a delay budget, admission
    /// recomputes bounds against the live service curves.
    Tbm,
}

impl fmt::Display for AcModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AcModel::Mhm => "MHM",
            AcModel::Tbm => "TBM",
        })
    }
}

/// How a flow's burst is assumed to grow along its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstIncrease {
    /// Never inflated.
    No,
    /// Inflated by `rate · deadline` from the second hop on.
    WorstCaseBurst,
    /// Checked like `WorstCaseBurst`, reserved like `Real`.
    #[default]
    WorstCaseBurstRealReservation,
    /// Inflated by `rate · (delay accumulated so far)`.
    Real,
}

impl BurstIncrease {
    /// Whether the accumulated upstream delay is tracked as a path parameter.
    pub fn tracks_delay(&self) -> bool {
        matches!(
            self,
            BurstIncrease::Real | BurstIncrease::WorstCaseBurstRealReservation
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetServConfigInput {
    pub version: u32,
    pub ac_model: Option<AcModel>,
    pub residual_mode: Option<ResidualMode>,
    pub burst_increase: Option<BurstIncrease>,
    pub input_link_shaping: Option<bool>,
    pub max_packet_size: Option<f64>,
    pub min_per_hop_delay: Option<f64>,
    pub allocation: Option<AllocationStrategy>,
    pub cost: Option<CostModelConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetServConfig {
    pub version: u32,
    pub ac_model: AcModel,
    pub residual_mode: ResidualMode,
    pub burst_increase: BurstIncrease,
    /// Shape each incoming link's aggregate by the link's own rate.
    pub input_link_shaping: bool,
    /// Bytes. Non-preemption term of every link's service curve.
    pub max_packet_size: f64,
    /// Seconds. Lower bound on per-hop delay, used for routing guesses.
    pub min_per_hop_delay: f64,
    pub allocation: AllocationStrategy,
    pub cost: CostModelConfig,
}

impl Default for DetServConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            ac_model: AcModel::Tbm,
            residual_mode: ResidualMode::default(),
            burst_increase: BurstIncrease::default(),
            input_link_shaping: false,
            max_packet_size: 1530.0,
            min_per_hop_delay: 1e-6,
            allocation: AllocationStrategy::default(),
            cost: CostModelConfig::default(),
        }
    }
}

impl DetServConfigInput {
    pub fn resolve(self) -> Result<DetServConfig> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(DnmError::Config(format!(
                "unsupported config version {version}"
            )));
        }

        let defaults = DetServConfig::default();
        let ac_model = self
            .ac_model
            .or_else(|| self.allocation.as_ref().map(AllocationStrategy::model))
            .unwrap_or(defaults.ac_model);
        let allocation = match self.allocation {
            Some(allocation) => allocation,
            None if ac_model == AcModel::Mhm => AllocationStrategy::default_mhm(),
            None => defaults.allocation,
        };

        let config = DetServConfig {
            version,
            ac_model,
            residual_mode: self.residual_mode.unwrap_or(defaults.residual_mode),
            burst_increase: self.burst_increase.unwrap_or(defaults.burst_increase),
            input_link_shaping: self
                .input_link_shaping
                .unwrap_or(defaults.input_link_shaping),
            max_packet_size: self.max_packet_size.unwrap_or(defaults.max_packet_size),
            min_per_hop_delay: self
                .min_per_hop_delay
                .unwrap_or(defaults.min_per_hop_delay),
            allocation,
            cost: self.cost.unwrap_or(defaults.cost),
        };
        config.validate()?;
        Ok(config)
    }
}

impl DetServConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let parsed: DetServConfigInput =
            toml::from_str(input).map_err(|e| DnmError::Config(e.to_string()))?;
        parsed.resolve()
    }

    /// Check internal consistency; [`DetServ::new`](crate::DetServ::new)
    /// refuses configurations that fail.
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("max packet size", self.max_packet_size)?;
        ensure_non_negative("min per-hop delay", self.min_per_hop_delay)?;
        let strategy_model = self.allocation.model();
        if strategy_model != self.ac_model {
            return Err(DnmError::ModelMismatch {
                strategy: self.allocation.name(),
                model: self.ac_model,
            });
        }
        self.allocation.validate()?;
        self.cost.validate()
    }
}
