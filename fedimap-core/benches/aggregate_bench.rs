// Benchmark mention aggregation and edge derivation throughput.

use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use fedimap_core::aggregate;
use fedimap_core::graph;
use fedimap_core::types::{Mention, PeerRelationship, Post};

fn generate_posts(count: usize) -> Vec<Post> {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| Post {
            id: i.to_string(),
            created_at: base - Duration::minutes(i as i64),
            mentions: (0..i % 4)
                .map(|m| Mention {
                    acct: if m == 0 {
                        format!("local{i}")
                    } else {
                        format!("user{m}@peer{}.social", (i + m) % 50)
                    },
                })
                .collect(),
        })
        .collect()
}

fn generate_relationships(instances: usize, fanout: usize) -> Vec<PeerRelationship> {
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let mut rels = Vec::with_capacity(instances * fanout);
    for i in 0..instances {
        for j in 1..=fanout {
            rels.push(PeerRelationship {
                source: format!("i{i}.social"),
                target: format!("i{}.social", (i + j) % instances),
                mention_count: (i * j % 7) as u64,
                statuses_seen: 100,
                first_seen: ts,
                last_updated: ts,
            });
        }
    }
    rels
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_reduce");
    let window_start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

    for count in [100, 1_000, 5_000] {
        let posts = generate_posts(count);
        group.bench_with_input(BenchmarkId::new("posts", count), &posts, |b, posts| {
            b.iter(|| aggregate::reduce(posts, "source.social", window_start));
        });
    }
    group.finish();
}

fn bench_build_edges(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_edges");

    for instances in [100, 1_000] {
        let rels = generate_relationships(instances, 20);
        group.bench_with_input(
            BenchmarkId::new("instances", instances),
            &rels,
            |b, rels| {
                b.iter(|| graph::build_edges(rels));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_reduce, bench_build_edges);
criterion_main!(benches);
