//! # Queue ledgers
//!
//! Per-queue bookkeeping: the aggregate token bucket reserved by the flows
//! registered on a queue, together with the queue's current service curve,
//! delay budget and (MHM only) admissible arrival cap.
//!
//! Reservations are accumulated in fixed point (1 nano-unit = 1e-9 byte or
//! byte/s) so that deregistering every registered flow returns the ledger
//! exactly to zero, independent of the order of operations.

use std::collections::BTreeMap;

use crate::curve::{Curve, TokenBucket};
use crate::topology::LinkId;

const NANO: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Nanos(i128);

impl Nanos {
    fn from_f64(value: f64) -> Self {
        Self((value * NANO).round() as i128)
    }

    fn to_f64(self) -> f64 {
        self.0 as f64 / NANO
    }
}

// ─── Token-bucket ledger ────────────────────────────────────────────────────

/// Running sum of the token buckets reserved on one queue (or on one
/// incoming link of a queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenBucketLedger {
    rate: Nanos,
    burst: Nanos,
}

impl TokenBucketLedger {
    pub fn add(&mut self, tb: TokenBucket) {
        self.rate.0 += Nanos::from_f64(tb.rate()).0;
        self.burst.0 += Nanos::from_f64(tb.burst()).0;
    }

    pub fn remove(&mut self, tb: TokenBucket) {
        self.rate.0 -= Nanos::from_f64(tb.rate()).0;
        self.burst.0 -= Nanos::from_f64(tb.burst()).0;
        if self.rate.0 < 0 || self.burst.0 < 0 {
            tracing::warn!(
                rate = self.rate.to_f64(),
                burst = self.burst.to_f64(),
                "ledger went negative, a flow was removed that was never added"
            );
        }
    }

    /// Reserved envelope. Negative balances read as zero.
    pub fn token_bucket(&self) -> TokenBucket {
        TokenBucket::from_parts(self.rate.to_f64().max(0.0), self.burst.to_f64().max(0.0))
    }

    pub fn is_empty(&self) -> bool {
        self.rate.0 == 0 && self.burst.0 == 0
    }
}

// ─── Utilization ────────────────────────────────────────────────────────────

/// Reserved traffic of one queue.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceUtilization {
    /// One aggregate over every flow.
    Aggregate(TokenBucketLedger),
    /// One aggregate per incoming link; used with input-link shaping.
    PerIncomingLink(BTreeMap<LinkId, TokenBucketLedger>),
}

impl ResourceUtilization {
    pub fn aggregate() -> Self {
        ResourceUtilization::Aggregate(TokenBucketLedger::default())
    }

    pub fn per_incoming_link() -> Self {
        ResourceUtilization::PerIncomingLink(BTreeMap::new())
    }

    /// Account for a flow entering through `incoming`.
    pub fn register(&mut self, incoming: LinkId, tb: TokenBucket) {
        match self {
            ResourceUtilization::Aggregate(ledger) => ledger.add(tb),
            ResourceUtilization::PerIncomingLink(map) => map.entry(incoming).or_default().add(tb),
        }
    }

    /// Reverse of [`register`](Self::register). An incoming link with no
    /// entry is left untouched.
    pub fn deregister(&mut self, incoming: LinkId, tb: TokenBucket) {
        match self {
            ResourceUtilization::Aggregate(ledger) => ledger.remove(tb),
            ResourceUtilization::PerIncomingLink(map) => {
                if let Some(ledger) = map.get_mut(&incoming) {
                    ledger.remove(tb);
                }
            }
        }
    }

    /// Unshaped sum of all reservations.
    pub fn total(&self) -> TokenBucket {
        match self {
            ResourceUtilization::Aggregate(ledger) => ledger.token_bucket(),
            ResourceUtilization::PerIncomingLink(map) => map
                .values()
                .fold(TokenBucket::zero(), |acc, l| acc + l.token_bucket()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ResourceUtilization::Aggregate(ledger) => ledger.is_empty(),
            ResourceUtilization::PerIncomingLink(map) => map.values().all(TokenBucketLedger::is_empty),
        }
    }
}

// ─── Queue state ────────────────────────────────────────────────────────────

/// Everything the evaluator knows about one priority queue.
#[derive(Debug, Clone)]
pub struct QueueState {
    pub(crate) buffer_size: f64,
    pub(crate) service_curve: Curve,
    pub(crate) max_arrival: Option<TokenBucket>,
    pub(crate) delay: f64,
    pub(crate) utilization: ResourceUtilization,
}

impl QueueState {
    /// Bytes.
    pub fn buffer_size(&self) -> f64 {
        self.buffer_size
    }

    pub fn service_curve(&self) -> &Curve {
        &self.service_curve
    }

    /// Largest admissible aggregate, set by MHM allocations.
    pub fn max_arrival(&self) -> Option<TokenBucket> {
        self.max_arrival
    }

    /// Worst-case queueing delay guaranteed to every flow on this queue.
    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn utilization(&self) -> &ResourceUtilization {
        &self.utilization
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tb(rate: f64, burst: f64) -> TokenBucket {
        TokenBucket::new(rate, burst).unwrap()
    }

    #[test]
    fn add_then_remove_is_exact() {
        let mut ledger = TokenBucketLedger::default();
        let flows = [tb(0.1, 0.2), tb(1e8 / 3.0, 7.7), tb(12.5e6, 186000.0)];
        for f in flows {
            ledger.add(f);
        }
        assert!(!ledger.is_empty());
        for f in flows.iter().rev() {
            ledger.remove(*f);
        }
        assert!(ledger.is_empty());
        assert_eq!(ledger.token_bucket(), TokenBucket::zero());
    }

    #[test]
    fn negative_balance_reads_as_zero() {
        let mut ledger = TokenBucketLedger::default();
        ledger.remove(tb(1.0, 1.0));
        assert_eq!(ledger.token_bucket(), TokenBucket::zero());
    }

    #[test]
    fn per_link_entries_are_independent() {
        let mut util = ResourceUtilization::per_incoming_link();
        util.register(LinkId(0), tb(1.0, 10.0));
        util.register(LinkId(1), tb(2.0, 20.0));
        util.register(LinkId(1), tb(2.0, 20.0));
        assert_eq!(util.total(), tb(5.0, 50.0));

        util.deregister(LinkId(5), tb(1.0, 1.0));
        assert_eq!(util.total(), tb(5.0, 50.0));

        util.deregister(LinkId(1), tb(2.0, 20.0));
        util.deregister(LinkId(1), tb(2.0, 20.0));
        assert_eq!(util.total(), tb(1.0, 10.0));
        util.deregister(LinkId(0), tb(1.0, 10.0));
        assert!(util.is_empty());
    }

    #[test]
    fn aggregate_ignores_incoming_link() {
        let mut util = ResourceUtilization::aggregate();
        util.register(LinkId(0), tb(1.0, 10.0));
        util.register(LinkId(9), tb(1.0, 10.0));
        assert_eq!(util.total(), tb(2.0, 20.0));
    }
}
