//! Property-based tests for the curve algebra and the bounds.
//!
//! Token buckets and rate-latency curves are drawn from realistic ranges
//! (bytes, bytes per second, seconds); the closed forms of the
//! token-bucket / rate-latency pair serve as oracle for the general
//! algorithms.

use detserv::curve::{backlog_bound, delay_bound, leftover_service};
use detserv::{Curve, RateLatency, ResidualMode, TokenBucket};
use proptest::prelude::*;

fn token_bucket() -> impl Strategy<Value = TokenBucket> {
    (0.0f64..1e9, 0.0f64..1e6).prop_map(|(rate, burst)| TokenBucket::new(rate, burst).unwrap())
}

fn rate_latency() -> impl Strategy<Value = RateLatency> {
    (1e3f64..1e9, 0.0f64..0.1).prop_map(|(rate, latency)| RateLatency::new(rate, latency).unwrap())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

// ─── Algebra ────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sum_is_commutative(a in token_bucket(), b in rate_latency()) {
        let (a, b) = (Curve::from(a), Curve::from(b));
        prop_assert!(a.add(&b).approx_eq(&b.add(&a)));
    }

    #[test]
    fn sum_of_token_buckets_is_associative(
        a in token_bucket(),
        b in token_bucket(),
        c in token_bucket(),
    ) {
        let (a, b, c) = (Curve::from(a), Curve::from(b), Curve::from(c));
        prop_assert!(a.add(&b).add(&c).approx_eq(&a.add(&b.add(&c))));
    }

    #[test]
    fn min_is_commutative(a in token_bucket(), b in token_bucket()) {
        let (a, b) = (Curve::from(a), Curve::from(b));
        prop_assert!(a.min(&b).approx_eq(&b.min(&a)));
    }

    #[test]
    fn min_of_token_buckets_is_associative(
        a in token_bucket(),
        b in token_bucket(),
        c in token_bucket(),
    ) {
        let (a, b, c) = (Curve::from(a), Curve::from(b), Curve::from(c));
        prop_assert!(a.min(&b).min(&c).approx_eq(&a.min(&b.min(&c))));
    }

    #[test]
    fn min_is_idempotent(a in token_bucket(), b in token_bucket()) {
        let c = Curve::from(a).min(&Curve::from(b));
        prop_assert!(c.min(&c).approx_eq(&c));
    }

    /// The minimum is the pointwise minimum of the two buckets.
    #[test]
    fn min_is_pointwise(a in token_bucket(), b in token_bucket(), t in 0.0f64..1.0) {
        let m = Curve::from(a).min(&Curve::from(b));
        let expected = (a.burst() + a.rate() * t).min(b.burst() + b.rate() * t);
        prop_assert!(close(m.value_at(t), expected), "{} vs {}", m.value_at(t), expected);
    }
}

// ─── Bounds ─────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn token_bucket_bounds_match_closed_form(tb in token_bucket(), rl in rate_latency()) {
        prop_assume!(tb.rate() < rl.rate());
        let (ac, sc) = (Curve::from(tb), Curve::from(rl));
        let delay = delay_bound(&ac, &sc);
        let backlog = backlog_bound(&ac, &sc);
        prop_assert!(close(delay, rl.latency() + tb.burst() / rl.rate()), "delay {delay}");
        prop_assert!(close(backlog, tb.burst() + tb.rate() * rl.latency()), "backlog {backlog}");
    }

    #[test]
    fn faster_arrival_is_unbounded(tb in token_bucket(), rl in rate_latency()) {
        prop_assume!(tb.rate() > rl.rate() * (1.0 + 1e-6));
        let (ac, sc) = (Curve::from(tb), Curve::from(rl));
        prop_assert!(delay_bound(&ac, &sc).is_infinite());
        prop_assert!(backlog_bound(&ac, &sc).is_infinite());
    }

    #[test]
    fn no_arrival_leaves_the_service_untouched(rl in rate_latency()) {
        let sc = Curve::from(rl);
        prop_assert!(leftover_service(&sc, &Curve::zero()).approx_eq(&sc));
    }

    #[test]
    fn leftover_never_exceeds_the_service(
        tb in token_bucket(),
        rl in rate_latency(),
        t in 0.0f64..1.0,
    ) {
        let sc = Curve::from(rl);
        let left = leftover_service(&sc, &Curve::from(tb));
        prop_assert!(left.value_at(t) <= sc.value_at(t) * (1.0 + 1e-9) + 1e-6);
    }
}

// ─── Residual modes ─────────────────────────────────────────────────────────

proptest! {
    /// Behind a single token bucket the leftover is itself rate-latency, so
    /// every policy returns `RL(R − r, (R·T + b) / (R − r))`.
    #[test]
    fn residual_modes_agree_behind_a_token_bucket(tb in token_bucket(), rl in rate_latency()) {
        prop_assume!(tb.rate() < rl.rate() * 0.99);
        let (ac, sc) = (Curve::from(tb), Curve::from(rl));
        let rate = rl.rate() - tb.rate();
        let latency = (rl.rate() * rl.latency() + tb.burst()) / rate;

        for mode in [ResidualMode::LeastLatency, ResidualMode::HighestSlope, ResidualMode::RealCurve] {
            let residual = mode.residual_service_curve(&sc, &ac);
            let got = residual.as_rate_latency();
            prop_assert!(got.is_some(), "{:?} gave {}", mode, residual);
            let got = got.unwrap();
            prop_assert!(close(got.rate(), rate), "{:?} rate {}", mode, got.rate());
            prop_assert!(close(got.latency(), latency), "{:?} latency {}", mode, got.latency());
        }
    }
}
