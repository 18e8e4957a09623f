//! # detserv
//!
//! Deterministic per-flow admission control for priority-queued links.
//!
//! Every link is a strict-priority scheduler. When a link is added, an
//! allocation strategy splits its rate, delay and buffer budget across its
//! queues. Flows described by a token-bucket envelope and a deadline are
//! then admitted hop by hop: the evaluator checks, with network-calculus
//! bounds, that every affected queue stays within its budget, and on
//! success records the flow in the queue ledgers and refreshes the derived
//! service curves.
//!
//! ## Crate structure
//!
//! - [`curve`] — Piecewise-linear curves, token buckets, rate-latency curves, bounds
//! - [`residual`] — Residual service curve policies
//! - [`ledger`] — Per-queue reservations and state
//! - [`allocation`] — MHM and TBM allocation strategies
//! - [`topology`] — Nodes, links and queue identifiers
//! - [`proxy`] — The per-hop contract driven by path search
//! - [`cost`] — Per-hop routing cost models
//! - [`config`] — Configuration (TOML)
//! - [`system`] — [`DetServ`], owner of all of the above
//!
//! ## Example
//!
//! ```
//! use detserv::{DetServ, DetServConfig, FlowRequest, LinkSpec, NodeKind, Path, QueueId};
//! use detserv::{RequestEnvelope, TokenBucket};
//!
//! let config = DetServConfig::from_toml_str(
//!     r#"
//!     [allocation]
//!     kind = "tbm_static_delays"
//!     delays = [0.00174, 0.0066, 0.01122]
//!     "#,
//! )?;
//! let mut dnm = DetServ::new(config)?;
//! let a = dnm.add_node("a", NodeKind::Host);
//! let b = dnm.add_node("b", NodeKind::Host);
//! let link = dnm.add_link(a, b, LinkSpec {
//!     rate: 125e6,
//!     propagation_delay: 0.0,
//!     buffer_sizes: vec![300000.0; 3],
//! })?;
//!
//! let envelope = RequestEnvelope::new(TokenBucket::new(40.25e6, 186000.0)?, 0.002)?;
//! let path = Path::new(vec![QueueId::new(link, 0)])?;
//! assert!(dnm.try_admit(&path, &FlowRequest::new(1, envelope))?);
//! # Ok::<(), detserv::DnmError>(())
//! ```

pub mod allocation;
pub mod config;
pub mod cost;
pub mod curve;
pub mod error;
mod evaluator;
pub mod ledger;
mod propagation;
pub mod proxy;
pub mod request;
pub mod residual;
pub mod system;
pub mod topology;

pub use allocation::{
    AllocationStrategy, QueueAllocation, ResourceAllocation, SelectResourceAllocation,
};
pub use config::{AcModel, BurstIncrease, DetServConfig, DetServConfigInput};
pub use cost::{CostModel, CostModelConfig};
pub use curve::{Curve, RateLatency, Segment, TokenBucket};
pub use error::{DnmError, Result};
pub use ledger::{QueueState, ResourceUtilization};
pub use proxy::{Hop, Path, PathProxy};
pub use request::{FlowRequest, RequestEnvelope};
pub use residual::ResidualMode;
pub use system::{DetServ, QueueReport, Scheduler};
pub use topology::{LinkId, LinkSpec, NodeId, NodeKind, QueueId, Topology};
