//! Admission latency benchmarks for detserv.
//!
//! Measures the per-request cost of the evaluator:
//! - has_access() on each queue of a loaded 3-queue TBM link
//! - is_admissible() on a 3-hop TBM path with input-link shaping
//! - register + deregister round trip (ledger update and service curve refresh)
//! - has_access() under MHM for comparison
//!
//! Run with: cargo bench --package detserv

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use detserv::{
    AcModel, AllocationStrategy, DetServ, DetServConfig, FlowRequest, Hop, LinkId, LinkSpec,
    NodeKind, Path, PathProxy, QueueId, RequestEnvelope, TokenBucket,
};

fn flow(id: u64, rate: f64, burst: f64, deadline: f64) -> FlowRequest {
    FlowRequest::new(
        id,
        RequestEnvelope::new(TokenBucket::new(rate, burst).unwrap(), deadline).unwrap(),
    )
}

fn spec() -> LinkSpec {
    LinkSpec {
        rate: 125e6,
        propagation_delay: 1e-6,
        buffer_sizes: vec![300000.0; 3],
    }
}

/// A line of `hops` links through switches, with a few flows already
/// admitted on every queue.
fn loaded_line(config: DetServConfig, hops: usize) -> (DetServ, Vec<LinkId>) {
    let mut dnm = DetServ::new(config).unwrap();
    let mut previous = dnm.add_node("h0", NodeKind::Host);
    let mut links = Vec::with_capacity(hops);
    for i in 1..=hops {
        let kind = if i == hops {
            NodeKind::Host
        } else {
            NodeKind::Switch
        };
        let next = dnm.add_node(format!("n{i}"), kind);
        links.push(dnm.add_link(previous, next, spec()).unwrap());
        previous = next;
    }

    let mut id = 0;
    for priority in 0..3 {
        for _ in 0..4 {
            id += 1;
            let path = Path::new(links.iter().map(|&l| QueueId::new(l, priority)).collect()).unwrap();
            let _ = dnm.try_admit(&path, &flow(id, 1e6, 3000.0, 0.1)).unwrap();
        }
    }
    (dnm, links)
}

fn tbm_config(input_link_shaping: bool) -> DetServConfig {
    DetServConfig {
        allocation: AllocationStrategy::TbmStaticDelays {
            delays: vec![0.00174, 0.0066, 0.01122],
        },
        input_link_shaping,
        ..DetServConfig::default()
    }
}

fn bench_tbm_has_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("tbm_has_access");
    let (dnm, links) = loaded_line(tbm_config(false), 1);
    let request = flow(1000, 2e6, 5000.0, 0.05);

    for priority in 0..3 {
        let hop = QueueId::new(links[0], priority);
        group.bench_function(format!("q{priority}"), |b| {
            b.iter(|| {
                let hop = Hop::new(&[], hop, &[0.0]);
                black_box(dnm.has_access(&hop, &request).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_tbm_is_admissible_ils(c: &mut Criterion) {
    let (dnm, links) = loaded_line(tbm_config(true), 3);
    let request = flow(1000, 2e6, 5000.0, 0.05);
    let path = Path::new(links.iter().map(|&l| QueueId::new(l, 1)).collect()).unwrap();

    c.bench_function("tbm_is_admissible_3hops_ils", |b| {
        b.iter(|| black_box(dnm.is_admissible(&path, &request).unwrap()));
    });
}

fn bench_register_round_trip(c: &mut Criterion) {
    let (mut dnm, links) = loaded_line(tbm_config(false), 3);
    let request = flow(1000, 2e6, 5000.0, 0.05);
    let path = Path::new(links.iter().map(|&l| QueueId::new(l, 0)).collect()).unwrap();

    c.bench_function("tbm_register_deregister_3hops", |b| {
        b.iter(|| {
            dnm.register(&path, &request).unwrap();
            dnm.deregister(&path, &request).unwrap();
        });
    });
}

fn bench_mhm_has_access(c: &mut Criterion) {
    let config = DetServConfig {
        ac_model: AcModel::Mhm,
        allocation: AllocationStrategy::default_mhm(),
        ..DetServConfig::default()
    };
    let (dnm, links) = loaded_line(config, 1);
    let request = flow(1000, 2e6, 5000.0, 0.05);
    let hop = QueueId::new(links[0], 0);

    c.bench_function("mhm_has_access", |b| {
        b.iter(|| {
            let hop = Hop::new(&[], hop, &[0.0]);
            black_box(dnm.has_access(&hop, &request).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_tbm_has_access,
    bench_tbm_is_admissible_ils,
    bench_register_round_trip,
    bench_mhm_has_access,
);
criterion_main!(benches);
