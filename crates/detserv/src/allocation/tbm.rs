//! Delay-budget allocations for the threshold-based model.
//!
//! TBM queues carry no rate or burst cap; admission recomputes bounds
//! against the live service curves and compares them to these budgets. A
//! budget of 0 leaves nothing to admit against.

use super::{AllocationContext, QueueAllocation, ResourceAllocation};
use crate::config::AcModel;
use crate::error::Result;

pub(crate) const DEFAULT_INITIAL_DELAY: f64 = 0.0002;

/// Each queue may wait six times as long as the one above it.
const DELAY_GROWTH: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TbmDelayRatios {
    initial_delay: f64,
}

impl TbmDelayRatios {
    pub const NAME: &'static str = "tbm_delay_ratios";

    pub fn new(initial_delay: f64) -> Self {
        Self { initial_delay }
    }
}

impl Default for TbmDelayRatios {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY)
    }
}

impl ResourceAllocation for TbmDelayRatios {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn model(&self) -> AcModel {
        AcModel::Tbm
    }

    fn allocate(&self, ctx: &AllocationContext<'_>) -> Result<Vec<QueueAllocation>> {
        let mut delay = self.initial_delay;
        let mut out = Vec::with_capacity(ctx.queue_count());
        for _ in 0..ctx.queue_count() {
            out.push(QueueAllocation::Tbm { delay });
            delay += (DELAY_GROWTH - 1.0) * delay;
        }
        Ok(out)
    }
}

/// Only the top queue is bounded, by the time its buffer takes to drain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TbmSilo;

impl TbmSilo {
    pub const NAME: &'static str = "tbm_silo";
}

impl ResourceAllocation for TbmSilo {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn model(&self) -> AcModel {
        AcModel::Tbm
    }

    fn allocate(&self, ctx: &AllocationContext<'_>) -> Result<Vec<QueueAllocation>> {
        let link = ctx.link;
        Ok(link
            .buffer_sizes
            .iter()
            .enumerate()
            .map(|(queue, &buffer)| QueueAllocation::Tbm {
                delay: if queue == 0 { buffer / link.rate } else { 0.0 },
            })
            .collect())
    }
}

/// Fixed budgets, highest priority first; queues past the end get 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TbmStaticDelays {
    delays: Vec<f64>,
}

impl TbmStaticDelays {
    pub const NAME: &'static str = "tbm_static_delays";

    pub fn new(delays: Vec<f64>) -> Self {
        Self { delays }
    }
}

impl ResourceAllocation for TbmStaticDelays {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn model(&self) -> AcModel {
        AcModel::Tbm
    }

    fn allocate(&self, ctx: &AllocationContext<'_>) -> Result<Vec<QueueAllocation>> {
        Ok((0..ctx.queue_count())
            .map(|queue| QueueAllocation::Tbm {
                delay: self.delays.get(queue).copied().unwrap_or(0.0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::test_support::link;

    fn delays(strategy: &dyn ResourceAllocation, buffers: &[f64]) -> Vec<f64> {
        let link = link(125e6, buffers);
        let ctx = AllocationContext {
            link: &link,
            max_packet_size: 1530.0,
        };
        strategy
            .allocate(&ctx)
            .unwrap()
            .iter()
            .map(QueueAllocation::delay)
            .collect()
    }

    #[test]
    fn delay_ratios_grow_sixfold() {
        let d = delays(&TbmDelayRatios::default(), &[1.0; 4]);
        let expected = [0.0002, 0.0012, 0.0072, 0.0432];
        for (got, want) in d.iter().zip(expected) {
            assert!((got - want).abs() < 1e-15, "{d:?}");
        }
    }

    #[test]
    fn silo_bounds_only_the_top_queue() {
        let d = delays(&TbmSilo, &[250000.0, 300000.0, 300000.0]);
        assert_eq!(d, vec![0.002, 0.0, 0.0]);
    }

    #[test]
    fn static_delays_pad_with_zero() {
        let d = delays(&TbmStaticDelays::new(vec![0.00174, 0.0066]), &[1.0; 3]);
        assert_eq!(d, vec![0.00174, 0.0066, 0.0]);
    }
}
