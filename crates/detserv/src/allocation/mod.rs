//! # Resource allocation
//!
//! Closed-form, scheduler-local strategies that split a link's budget across
//! its priority queues. A strategy runs once, when the link's scheduler is
//! created, and its output is never revisited.
//!
//! - [`MhmRateRatios`] — fixed rate share and burst cap per queue (MHM)
//! - [`TbmDelayRatios`] — geometrically growing delay budgets (TBM)
//! - [`TbmSilo`] — only the top queue is bounded, by its drain time (TBM)
//! - [`TbmStaticDelays`] — caller-supplied delay budgets (TBM)

pub mod mhm;
pub mod tbm;

use std::fmt;

use serde::Deserialize;

pub use mhm::MhmRateRatios;
pub use tbm::{TbmDelayRatios, TbmSilo, TbmStaticDelays};

use crate::config::AcModel;
use crate::curve::{RateLatency, TokenBucket};
use crate::error::{DnmError, Result};
use crate::topology::Link;

// ─── Strategy contract ──────────────────────────────────────────────────────

/// What a strategy hands out for one queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueueAllocation {
    Mhm { max_arrival: TokenBucket, delay: f64 },
    Tbm { delay: f64 },
}

impl QueueAllocation {
    pub fn delay(&self) -> f64 {
        match self {
            QueueAllocation::Mhm { delay, .. } | QueueAllocation::Tbm { delay } => *delay,
        }
    }
}

/// Link-level inputs of an allocation.
#[derive(Debug, Clone, Copy)]
pub struct AllocationContext<'a> {
    pub link: &'a Link,
    pub max_packet_size: f64,
}

impl AllocationContext<'_> {
    /// `β(R, 2M/R)`: the link rate minus one non-preemptable packet in
    /// service and one in transmission.
    pub fn link_service_curve(&self) -> RateLatency {
        let rate = self.link.rate;
        RateLatency::from_parts(rate, 2.0 * self.max_packet_size / rate)
    }

    pub fn queue_count(&self) -> usize {
        self.link.queue_count()
    }
}

pub trait ResourceAllocation: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn model(&self) -> AcModel;

    /// One entry per queue of the link, highest priority first.
    fn allocate(&self, ctx: &AllocationContext<'_>) -> Result<Vec<QueueAllocation>>;
}

/// Picks the strategy for a newly created scheduler.
pub trait SelectResourceAllocation: Send + Sync {
    fn select(&self, link: &Link) -> Box<dyn ResourceAllocation>;
}

impl<F> SelectResourceAllocation for F
where
    F: Fn(&Link) -> Box<dyn ResourceAllocation> + Send + Sync,
{
    fn select(&self, link: &Link) -> Box<dyn ResourceAllocation> {
        self(link)
    }
}

/// The strategy bound to one scheduler.
#[derive(Debug)]
pub struct SelectedResourceAllocation {
    strategy: Box<dyn ResourceAllocation>,
}

impl SelectedResourceAllocation {
    pub(crate) fn new(strategy: Box<dyn ResourceAllocation>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &dyn ResourceAllocation {
        self.strategy.as_ref()
    }
}

// ─── Configured strategies ──────────────────────────────────────────────────

/// Strategy selection as written in configuration files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllocationStrategy {
    MhmRateRatios {
        #[serde(default = "default_rate_ratios")]
        ratios: Vec<f64>,
    },
    TbmDelayRatios {
        #[serde(default = "default_initial_delay")]
        initial_delay: f64,
    },
    TbmSilo,
    TbmStaticDelays {
        delays: Vec<f64>,
    },
}

fn default_rate_ratios() -> Vec<f64> {
    vec![1.0 / 3.0; 3]
}

fn default_initial_delay() -> f64 {
    tbm::DEFAULT_INITIAL_DELAY
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        AllocationStrategy::TbmDelayRatios {
            initial_delay: default_initial_delay(),
        }
    }
}

impl AllocationStrategy {
    pub fn default_mhm() -> Self {
        AllocationStrategy::MhmRateRatios {
            ratios: default_rate_ratios(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AllocationStrategy::MhmRateRatios { .. } => MhmRateRatios::NAME,
            AllocationStrategy::TbmDelayRatios { .. } => TbmDelayRatios::NAME,
            AllocationStrategy::TbmSilo => TbmSilo::NAME,
            AllocationStrategy::TbmStaticDelays { .. } => TbmStaticDelays::NAME,
        }
    }

    pub fn model(&self) -> AcModel {
        match self {
            AllocationStrategy::MhmRateRatios { .. } => AcModel::Mhm,
            _ => AcModel::Tbm,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let values: &[f64] = match self {
            AllocationStrategy::MhmRateRatios { ratios } => ratios,
            AllocationStrategy::TbmDelayRatios { initial_delay } => std::slice::from_ref(initial_delay),
            AllocationStrategy::TbmSilo => &[],
            AllocationStrategy::TbmStaticDelays { delays } => delays,
        };
        for &v in values {
            if !v.is_finite() || v < 0.0 {
                return Err(DnmError::Config(format!(
                    "{}: parameter {v} must be finite and non-negative",
                    self.name()
                )));
            }
        }
        if let AllocationStrategy::MhmRateRatios { ratios } = self {
            let total: f64 = ratios.iter().sum();
            if total > 1.0 + crate::curve::EPSILON {
                return Err(DnmError::Config(format!(
                    "{}: ratios sum to {total}, more than the link rate",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Box<dyn ResourceAllocation> {
        match self {
            AllocationStrategy::MhmRateRatios { ratios } => Box::new(MhmRateRatios::new(ratios.clone())),
            AllocationStrategy::TbmDelayRatios { initial_delay } => {
                Box::new(TbmDelayRatios::new(*initial_delay))
            }
            AllocationStrategy::TbmSilo => Box::new(TbmSilo),
            AllocationStrategy::TbmStaticDelays { delays } => {
                Box::new(TbmStaticDelays::new(delays.clone()))
            }
        }
    }
}

impl SelectResourceAllocation for AllocationStrategy {
    fn select(&self, _link: &Link) -> Box<dyn ResourceAllocation> {
        self.build()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::topology::{Link, LinkId, NodeId};

    pub fn link(rate: f64, buffers: &[f64]) -> Link {
        Link {
            id: LinkId(0),
            source: NodeId(0),
            destination: NodeId(1),
            rate,
            propagation_delay: 0.0,
            buffer_sizes: buffers.to_vec(),
        }
    }
}
