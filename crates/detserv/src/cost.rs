//! Per-hop routing cost handed to the path search.

use std::fmt;

use serde::Deserialize;

use crate::error::{DnmError, Result};
use crate::ledger::QueueState;
use crate::request::FlowRequest;
use crate::topology::{Link, QueueId};

/// Everything a cost model may look at for one candidate hop.
#[derive(Debug, Clone, Copy)]
pub struct CostContext<'a> {
    pub queue: QueueId,
    pub state: &'a QueueState,
    pub link: &'a Link,
    pub request: &'a FlowRequest,
}

pub trait CostModel: fmt::Debug + Send + Sync {
    fn cost(&self, ctx: &CostContext<'_>) -> f64;

    /// Lower bound of [`cost`](Self::cost), used for hop-count guesses.
    fn min_cost(&self) -> f64;

    fn max_cost(&self) -> f64;
}

/// Same cost for every hop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantCost(pub f64);

impl CostModel for ConstantCost {
    fn cost(&self, _ctx: &CostContext<'_>) -> f64 {
        self.0
    }

    fn min_cost(&self) -> f64 {
        self.0
    }

    fn max_cost(&self) -> f64 {
        self.0
    }
}

/// `1 / (1 + priority)`: the top queue costs 1, lower queues are cheaper,
/// so flows only use high priorities when their deadline demands it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QueuePriorityCost;

impl CostModel for QueuePriorityCost {
    fn cost(&self, ctx: &CostContext<'_>) -> f64 {
        1.0 / (1.0 + ctx.queue.priority as f64)
    }

    fn min_cost(&self) -> f64 {
        0.0
    }

    fn max_cost(&self) -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostModelConfig {
    Constant {
        value: f64,
    },
    #[default]
    QueuePriority,
}

impl CostModelConfig {
    pub fn build(&self) -> Box<dyn CostModel> {
        match self {
            CostModelConfig::Constant { value } => Box::new(ConstantCost(*value)),
            CostModelConfig::QueuePriority => Box::new(QueuePriorityCost),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            CostModelConfig::Constant { value } if !value.is_finite() || *value < 0.0 => Err(
                DnmError::Config(format!("constant cost {value} must be finite and non-negative")),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Curve, TokenBucket};
    use crate::ledger::ResourceUtilization;
    use crate::request::RequestEnvelope;
    use crate::topology::{LinkId, NodeId};

    #[test]
    fn priority_cost_prefers_low_priorities() {
        let link = Link {
            id: LinkId(0),
            source: NodeId(0),
            destination: NodeId(1),
            rate: 1.0,
            propagation_delay: 0.0,
            buffer_sizes: vec![1.0; 3],
        };
        let state = QueueState {
            buffer_size: 1.0,
            service_curve: Curve::zero(),
            max_arrival: None,
            delay: 0.0,
            utilization: ResourceUtilization::aggregate(),
        };
        let request = FlowRequest::new(
            1,
            RequestEnvelope::new(TokenBucket::zero(), 1.0).unwrap(),
        );
        let costs: Vec<f64> = (0..3)
            .map(|p| {
                QueuePriorityCost.cost(&CostContext {
                    queue: QueueId::new(LinkId(0), p),
                    state: &state,
                    link: &link,
                    request: &request,
                })
            })
            .collect();
        assert_eq!(costs, vec![1.0, 0.5, 1.0 / 3.0]);
        assert_eq!(QueuePriorityCost.min_cost(), 0.0);
        assert_eq!(QueuePriorityCost.max_cost(), 1.0);
    }

    #[test]
    fn constant_cost_validation() {
        assert!(CostModelConfig::Constant { value: -1.0 }.validate().is_err());
        assert!(CostModelConfig::Constant { value: 2.0 }.validate().is_ok());
        assert_eq!(CostModelConfig::Constant { value: 2.0 }.build().min_cost(), 2.0);
    }
}
