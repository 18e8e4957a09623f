//! Rate-ratio allocation for the multi-hop model.
//!
//! Queue `i` gets `r_i = R·ratio_i`. With `R_i = R − Σ_{j<i} r_j` the rate
//! left after higher priorities, its burst cap is what fits in the buffer:
//!
//! ```text
//! b_i = max(0, buffer_i − r_i·(Σ_{j<i} b_j + 2M) / R_i)
//! d_i = (Σ_{j<i} b_j + b_i + 2M) / R_i
//! ```

use super::{AllocationContext, QueueAllocation, ResourceAllocation};
use crate::config::AcModel;
use crate::curve::TokenBucket;
use crate::error::{DnmError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct MhmRateRatios {
    ratios: Vec<f64>,
}

impl MhmRateRatios {
    pub const NAME: &'static str = "mhm_rate_ratios";

    pub fn new(ratios: Vec<f64>) -> Self {
        Self { ratios }
    }
}

impl ResourceAllocation for MhmRateRatios {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn model(&self) -> AcModel {
        AcModel::Mhm
    }

    fn allocate(&self, ctx: &AllocationContext<'_>) -> Result<Vec<QueueAllocation>> {
        let link_rate = ctx.link.rate;
        let non_preemption = 2.0 * ctx.max_packet_size;
        let mut higher_rate = 0.0;
        let mut higher_burst = 0.0;
        let mut out = Vec::with_capacity(ctx.queue_count());

        for (queue, &buffer) in ctx.link.buffer_sizes.iter().enumerate() {
            let ratio = *self
                .ratios
                .get(queue)
                .ok_or(DnmError::MissingAllocationParameter {
                    strategy: Self::NAME,
                    queue,
                })?;
            let rate = link_rate * ratio;
            let remaining = link_rate - higher_rate;
            if remaining <= 0.0 {
                return Err(DnmError::Config(format!(
                    "{}: no rate left for queue {queue} of {}",
                    Self::NAME,
                    ctx.link.id
                )));
            }
            let burst = (buffer - rate * (higher_burst + non_preemption) / remaining).max(0.0);
            let delay = (higher_burst + burst + non_preemption) / remaining;

            tracing::debug!(
                link = %ctx.link.id,
                queue,
                rate,
                burst,
                delay,
                "mhm queue allocated"
            );
            out.push(QueueAllocation::Mhm {
                max_arrival: TokenBucket::from_parts(rate, burst),
                delay,
            });
            higher_rate += rate;
            higher_burst += burst;
        }
        Ok(out)
    }
}
