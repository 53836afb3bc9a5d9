use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use estatehub_commissions::{plan_distribution, DistributionPolicy, ReferralLevels};
use estatehub_core::{AgentId, Money};
use uuid::Uuid;

fn agent(n: u128) -> AgentId {
    AgentId::from_uuid(Uuid::from_u128(n))
}

/// Referral tree with `width` agents on each of `depth` levels.
fn build_levels(width: usize, depth: usize) -> ReferralLevels {
    let mut levels = ReferralLevels::new(agent(0));
    let mut next = 1u128;
    for _ in 0..depth {
        let members: Vec<AgentId> = (0..width)
            .map(|_| {
                next += 1;
                agent(next)
            })
            .collect();
        levels.push_level(members);
    }
    levels
}

fn bench_direct_referrals(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_direct_referrals");
    let policy = DistributionPolicy::direct_only();

    for width in [1usize, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*width as u64));
        let levels = build_levels(*width, 1);
        group.bench_with_input(BenchmarkId::new("width", width), &levels, |b, levels| {
            b.iter(|| {
                plan_distribution(black_box(Money::from_minor(500_000)), levels, &policy).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_multi_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_multi_level");
    let policy =
        DistributionPolicy::with_level_weights(vec![10_000, 5_000, 2_500, 1_250]).unwrap();

    for width in [10usize, 100, 1_000].iter() {
        group.throughput(Throughput::Elements((*width * 4) as u64));
        let levels = build_levels(*width, 4);
        group.bench_with_input(BenchmarkId::new("width", width), &levels, |b, levels| {
            b.iter(|| {
                plan_distribution(black_box(Money::from_minor(9_999_999)), levels, &policy)
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_level_collection(c: &mut Criterion) {
    c.bench_function("collect_levels_with_duplicates", |b| {
        let candidates: Vec<AgentId> = (0..2_000u128).map(|n| agent(n % 700 + 1)).collect();
        b.iter(|| {
            let mut levels = ReferralLevels::new(agent(0));
            levels.push_level(black_box(candidates.iter().copied()));
            levels
        });
    });
}

criterion_group!(
    benches,
    bench_direct_referrals,
    bench_multi_level,
    bench_level_collection,
);
criterion_main!(benches);
