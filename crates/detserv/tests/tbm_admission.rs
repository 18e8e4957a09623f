//! Threshold-based model: admission against static delay budgets on a
//! single gigabit link with three priority queues.

use detserv::{
    AllocationStrategy, DetServ, DetServConfig, FlowRequest, LinkId, LinkSpec, NodeKind, Path,
    PathProxy, QueueId, RequestEnvelope, TokenBucket,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

const LINK_RATE: f64 = 1e9 / 8.0;

fn static_delay_link() -> (DetServ, LinkId) {
    let config = DetServConfig {
        allocation: AllocationStrategy::TbmStaticDelays {
            delays: vec![0.00174, 0.0066, 0.01122],
        },
        ..DetServConfig::default()
    };
    let mut dnm = DetServ::new(config).unwrap();
    let h1 = dnm.add_node("h1", NodeKind::Host);
    let h2 = dnm.add_node("h2", NodeKind::Host);
    let link = dnm
        .add_link(
            h1,
            h2,
            LinkSpec {
                rate: LINK_RATE,
                propagation_delay: 0.0,
                buffer_sizes: vec![300000.0; 3],
            },
        )
        .unwrap();
    (dnm, link)
}

fn flow(id: u64, rate: f64, burst: f64, deadline: f64) -> FlowRequest {
    FlowRequest::new(
        id,
        RequestEnvelope::new(TokenBucket::new(rate, burst).unwrap(), deadline).unwrap(),
    )
}

fn single_hop(link: LinkId, priority: usize) -> Path {
    Path::new(vec![QueueId::new(link, priority)]).unwrap()
}

fn reserved(dnm: &DetServ, link: LinkId, priority: usize) -> TokenBucket {
    dnm.queue(QueueId::new(link, priority))
        .unwrap()
        .utilization()
        .total()
}

fn assert_close(got: f64, want: f64) {
    assert!(
        (got - want).abs() <= 1e-6 * want.abs().max(1.0),
        "got {got}, want {want}"
    );
}

/// Cheapest admissible queue under the priority cost, like a path search
/// restricted to one link would pick.
fn cheapest(dnm: &DetServ, link: LinkId, request: &FlowRequest) -> Option<usize> {
    (0..3)
        .filter(|&p| dnm.is_admissible(&single_hop(link, p), request).unwrap())
        .min_by(|&a, &b| {
            let cost = |p| {
                dnm.cost(&detserv::Hop::new(&[], QueueId::new(link, p), &[]), request)
                    .unwrap()
            };
            cost(a).total_cmp(&cost(b))
        })
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

#[test]
fn top_queue_admits_then_rejects_tight_deadline() {
    let (mut dnm, link) = static_delay_link();

    let first = flow(1, 40.25e6, 186000.0, 0.002);
    assert!(dnm.try_admit(&single_hop(link, 0), &first).unwrap());
    assert_eq!(
        reserved(&dnm, link, 0),
        TokenBucket::new(40.25e6, 186000.0).unwrap()
    );

    let snapshot: Vec<TokenBucket> = (0..3).map(|p| reserved(&dnm, link, p)).collect();
    let tight = flow(2, 40.25e6, 186000.0, 0.0001);
    for p in 0..3 {
        assert!(!dnm.try_admit(&single_hop(link, p), &tight).unwrap());
    }
    let after: Vec<TokenBucket> = (0..3).map(|p| reserved(&dnm, link, p)).collect();
    assert_eq!(snapshot, after);
}

#[test]
fn service_curves_follow_reservations() {
    let (mut dnm, link) = static_delay_link();
    assert!(dnm
        .try_admit(&single_hop(link, 0), &flow(1, 40.25e6, 186000.0, 0.002))
        .unwrap());

    // 125e6 (t − 24.48µs) = 186000 + 40.25e6 t
    let q1 = dnm
        .queue(QueueId::new(link, 1))
        .unwrap()
        .service_curve()
        .as_rate_latency()
        .unwrap();
    assert_close(q1.rate(), 84.75e6);
    assert_close(q1.latency(), 189060.0 / 84.75e6);

    // Nothing reserved on queue 1, queue 2 sees the same curve.
    let q2 = dnm
        .queue(QueueId::new(link, 2))
        .unwrap()
        .service_curve()
        .as_rate_latency()
        .unwrap();
    assert_close(q2.rate(), q1.rate());
    assert_close(q2.latency(), q1.latency());
}

#[test]
fn flows_land_on_cheapest_feasible_queue() {
    let (mut dnm, link) = static_delay_link();

    let admissions = [
        (flow(1, 40.25e6, 186000.0, 0.002), Some(0)),
        (flow(2, 34.375e6, 195000.0, 0.007), Some(1)),
        (flow(3, 11.625e6, 90000.0, 0.1), Some(2)),
        // Too much for queue 2's budget whichever queue it goes to.
        (flow(4, 10.125e6, 5500.0, 0.01), None),
        (flow(5, 3.75e6, 15000.0, 0.01), Some(1)),
    ];

    let mut admitted = Vec::new();
    for (request, expected) in admissions {
        let choice = cheapest(&dnm, link, &request);
        assert_eq!(choice, expected, "flow {}", request.id);
        if let Some(p) = choice {
            assert!(dnm.try_admit(&single_hop(link, p), &request).unwrap());
            admitted.push((request, p));
        }
    }

    let q1 = reserved(&dnm, link, 1);
    assert_close(q1.rate(), 38.125e6);
    assert_close(q1.burst(), 210000.0);

    for (request, p) in admitted.iter().rev() {
        assert!(dnm.withdraw(&single_hop(link, *p), request).unwrap());
    }
    for p in 0..3 {
        assert_eq!(reserved(&dnm, link, p), TokenBucket::zero());
    }
}

#[test]
fn lower_queue_budget_guards_higher_admissions() {
    let (mut dnm, link) = static_delay_link();
    let greedy = flow(2, 108.5e6, 100000.0, 0.01);
    assert!(dnm.is_admissible(&single_hop(link, 0), &greedy).unwrap());

    assert!(dnm
        .try_admit(&single_hop(link, 2), &flow(1, 11.625e6, 90000.0, 0.1))
        .unwrap());
    let report = dnm.queue_report(QueueId::new(link, 2)).unwrap();
    assert!(report.delay_bound < report.delay_budget);

    // The residual left by the greedy flow would push queue 2 past 11.22 ms.
    assert!(!dnm.is_admissible(&single_hop(link, 0), &greedy).unwrap());
}

#[test]
fn silo_budgets_only_the_top_queue() {
    let config = DetServConfig {
        allocation: AllocationStrategy::TbmSilo,
        ..DetServConfig::default()
    };
    let mut dnm = DetServ::new(config).unwrap();
    let h1 = dnm.add_node("h1", NodeKind::Host);
    let h2 = dnm.add_node("h2", NodeKind::Host);
    let spec = |queues| LinkSpec {
        rate: LINK_RATE,
        propagation_delay: 0.0,
        buffer_sizes: vec![250000.0; queues],
    };
    let single = dnm.add_link(h1, h2, spec(1)).unwrap();
    let double = dnm.add_link(h2, h1, spec(2)).unwrap();

    let report = dnm.queue_report(QueueId::new(single, 0)).unwrap();
    assert_close(report.delay_budget, 0.002);

    let small = flow(1, 1e6, 1000.0, 1.0);
    assert!(dnm.is_admissible(&single_hop(single, 0), &small).unwrap());

    // A zero budget rejects everything, and queue 1 is checked on behalf
    // of queue 0 as well.
    assert_eq!(dnm.queue(QueueId::new(double, 1)).unwrap().delay(), 0.0);
    assert!(!dnm.is_admissible(&single_hop(double, 1), &small).unwrap());
    assert!(!dnm.is_admissible(&single_hop(double, 0), &small).unwrap());
}
