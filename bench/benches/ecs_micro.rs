//! Micro benchmarks for the runtime's hot paths: entity churn, field
//! writes, and query observation.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use weft_bench::populated_world;
use weft_ecs::query::Descriptor;
use weft_ecs::schedule::Schedule;

fn entity_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_churn");
    for &count in &[1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let bench = populated_world(count, 7);
            b.iter(|| {
                let entity = bench.world.create_entity().unwrap();
                bench.world.add_component(entity, bench.pos, None);
                bench.world.remove_entity(entity);
            });
        });
    }
    group.finish();
}

fn field_writes(c: &mut Criterion) {
    let bench = populated_world(10_000, 7);
    let store = bench.world.store(bench.pos).clone();
    let query = bench.world.query(Descriptor::new().with(&[bench.pos]));
    let ctx = bench.world.context();
    let entities = query.current(&ctx);

    c.bench_function("write_x_10k", |b| {
        b.iter(|| {
            for &entity in &entities {
                let x = store.read(entity).f32("x");
                store.write(entity).set_f32("x", x + 1.0);
            }
        });
    });
}

fn query_observation(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_observe");
    for &count in &[1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let bench = populated_world(count, 7);
            let store = bench.world.store(bench.pos).clone();
            let mut query = bench
                .world
                .query(Descriptor::new().with(&[bench.pos]).tracking(&[bench.pos]));
            let ctx = bench.world.context();
            let entities = query.current(&ctx);
            // Settle the seed observation.
            query.added(&ctx);

            let mut schedule = Schedule::new();
            b.iter(|| {
                // A tick's worth of writes, then one observation pass in
                // the next frame.
                for &entity in entities.iter().take(64) {
                    store.write(entity).set_f32("x", 1.0);
                }
                schedule.tick(&bench.world).unwrap();
                query.changed(&ctx).len()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, entity_churn, field_writes, query_observation);
criterion_main!(benches);
