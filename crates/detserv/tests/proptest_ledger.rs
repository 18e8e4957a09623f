//! Property-based tests for the queue ledgers: any set of registrations
//! undone in any order leaves nothing behind.

use detserv::{LinkId, ResourceUtilization, TokenBucket};
use proptest::prelude::*;

fn reservations() -> impl Strategy<Value = Vec<(LinkId, TokenBucket)>> {
    prop::collection::vec(
        (0usize..4, 0.0f64..1e9, 0.0f64..1e6).prop_map(|(link, rate, burst)| {
            (LinkId(link), TokenBucket::new(rate, burst).unwrap())
        }),
        1..32,
    )
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

proptest! {
    #[test]
    fn deregistering_everything_empties_the_ledger(
        flows in reservations(),
        per_link in any::<bool>(),
        shift in 0usize..32,
    ) {
        let mut ledger = if per_link {
            ResourceUtilization::per_incoming_link()
        } else {
            ResourceUtilization::aggregate()
        };
        for &(link, tb) in &flows {
            ledger.register(link, tb);
        }

        let mut undo = flows.clone();
        // Removal order differs from insertion order.
        let undo_len = undo.len();
        undo.rotate_left(shift % undo_len);
        undo.reverse();
        for &(link, tb) in &undo {
            ledger.deregister(link, tb);
        }
        prop_assert!(ledger.is_empty());
        prop_assert_eq!(ledger.total(), TokenBucket::zero());
    }

    #[test]
    fn total_is_the_sum_of_reservations(flows in reservations(), per_link in any::<bool>()) {
        let mut ledger = if per_link {
            ResourceUtilization::per_incoming_link()
        } else {
            ResourceUtilization::aggregate()
        };
        for &(link, tb) in &flows {
            ledger.register(link, tb);
        }
        let rate: f64 = flows.iter().map(|(_, tb)| tb.rate()).sum();
        let burst: f64 = flows.iter().map(|(_, tb)| tb.burst()).sum();
        let total = ledger.total();
        prop_assert!(close(total.rate(), rate), "{} vs {}", total.rate(), rate);
        prop_assert!(close(total.burst(), burst), "{} vs {}", total.burst(), burst);
    }

    /// Removing a flow from an incoming link it never used does not touch
    /// the links it did use.
    #[test]
    fn unknown_incoming_link_is_ignored(flows in reservations()) {
        let mut ledger = ResourceUtilization::per_incoming_link();
        for &(link, tb) in &flows {
            ledger.register(link, tb);
        }
        let before = ledger.clone();
        ledger.deregister(LinkId(99), TokenBucket::new(1.0, 1.0).unwrap());
        prop_assert_eq!(ledger, before);
    }
}
