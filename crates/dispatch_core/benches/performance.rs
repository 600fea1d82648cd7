//! Performance benchmarks for dispatch_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dispatch_core::model::{City, DriverId, PassengerId};
use dispatch_core::spatial::DriverGeoIndex;
use dispatch_core::test_helpers::{create_ride_request, harness, TEST_PICKUP};

fn bench_radius_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("geo_radius_query");
    for drivers in [100usize, 1_000, 10_000] {
        let index = DriverGeoIndex::new();
        // Spread drivers over a ~20km square around the query point.
        for i in 0..drivers {
            let lat = TEST_PICKUP.lat + ((i % 100) as f64 - 50.0) * 0.002;
            let lon = TEST_PICKUP.lon + ((i / 100) as f64 - 50.0) * 0.002;
            index
                .upsert(City::Mumbai, DriverId::new(), lat, lon)
                .expect("upsert");
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(drivers),
            &index,
            |b, index| {
                b.iter(|| {
                    black_box(
                        index
                            .query_radius(City::Mumbai, TEST_PICKUP.lat, TEST_PICKUP.lon, 5.0)
                            .expect("query"),
                    )
                });
            },
        );
    }
    group.finish();
}

fn bench_create_ride_unmatched(c: &mut Criterion) {
    let h = harness();
    c.bench_function("create_ride_unmatched", |b| {
        b.iter(|| {
            black_box(
                h.dispatch
                    .create_ride(create_ride_request(PassengerId::new(), None))
                    .expect("create ride"),
            )
        });
    });
}

criterion_group!(benches, bench_radius_query, bench_create_ride_unmatched);
criterion_main!(benches);
