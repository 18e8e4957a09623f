//! # Path-search contract
//!
//! The narrow interface a constrained path search drives, one candidate hop
//! at a time. The search owns the exploration; the proxy answers whether a
//! hop is admissible, what it costs, how much of the flow's constraint
//! budget it consumes, and finally commits or releases complete paths.

use crate::error::{DnmError, Result};
use crate::request::FlowRequest;
use crate::topology::{NodeId, QueueId};

/// A complete path: the queue used on every link from source to destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    hops: Vec<QueueId>,
}

impl Path {
    pub fn new(hops: Vec<QueueId>) -> Result<Self> {
        if hops.is_empty() {
            return Err(DnmError::EmptyPath);
        }
        Ok(Self { hops })
    }

    pub fn hops(&self) -> &[QueueId] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Each step of the path with the queues before it.
    pub fn steps(&self) -> impl Iterator<Item = (&[QueueId], QueueId)> + '_ {
        self.hops
            .iter()
            .enumerate()
            .map(|(i, &candidate)| (&self.hops[..i], candidate))
    }
}

/// One step of a path search.
#[derive(Debug, Clone, Copy)]
pub struct Hop<'a> {
    /// Queues already on the path, in path order.
    pub previous: &'a [QueueId],
    pub candidate: QueueId,
    /// Path parameters accumulated up to `candidate`.
    pub parameters: &'a [f64],
}

impl<'a> Hop<'a> {
    pub fn new(previous: &'a [QueueId], candidate: QueueId, parameters: &'a [f64]) -> Self {
        Self {
            previous,
            candidate,
            parameters,
        }
    }

    /// The queue right before `candidate`.
    pub fn upstream(&self) -> Option<QueueId> {
        self.previous.last().copied()
    }

    pub fn is_first(&self) -> bool {
        self.previous.is_empty()
    }
}

pub trait PathProxy {
    /// Whether this proxy evaluates `request` at all.
    fn handle(&self, request: &FlowRequest) -> bool;

    fn number_of_constraints(&self, request: &FlowRequest) -> usize;

    fn number_of_parameters(&self, request: &FlowRequest) -> usize;

    /// Parameters to carry into `hop.candidate`, derived from those carried
    /// into its predecessor.
    fn new_parameters(&self, hop: &Hop<'_>, request: &FlowRequest) -> Result<Vec<f64>>;

    /// Admission test. `Ok(false)` is a rejection, never an error.
    fn has_access(&self, hop: &Hop<'_>, request: &FlowRequest) -> Result<bool>;

    fn cost(&self, hop: &Hop<'_>, request: &FlowRequest) -> Result<f64>;

    /// Per-hop contribution to each constraint.
    fn constraint_values(&self, hop: &Hop<'_>, request: &FlowRequest) -> Result<Vec<f64>>;

    /// Upper bound of each constraint summed over the path.
    fn constraint_bounds(&self, request: &FlowRequest) -> Result<Vec<f64>>;

    fn register_hop(&mut self, hop: &Hop<'_>, request: &FlowRequest) -> Result<bool>;

    fn deregister_hop(&mut self, hop: &Hop<'_>, request: &FlowRequest) -> Result<bool>;

    fn register(&mut self, path: &Path, request: &FlowRequest) -> Result<bool>;

    fn deregister(&mut self, path: &Path, request: &FlowRequest) -> Result<bool>;

    /// Optimistic estimate of the cost between two nodes.
    fn cost_guess(&self, source: NodeId, destination: NodeId) -> f64;

    /// Optimistic estimate of constraint `index` between two nodes.
    fn constraint_guess(&self, index: usize, source: NodeId, destination: NodeId) -> Result<f64>;
}
