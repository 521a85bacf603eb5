use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use entitystore::{
    props, Entity, EntityConfig, InMemoryStorage, KeySpec, Properties, PropertyType,
    ScanOptions, SetupOptions,
};

fn bound_entity() -> Entity {
    let entity = Entity::configure(
        EntityConfig::new("taskId", KeySpec::constant("task"))
            .property("taskId", PropertyType::String)
            .property("provisionerId", PropertyType::String)
            .property("workerType", PropertyType::String)
            .property("retries", PropertyType::Integer),
    )
    .unwrap();
    entity
        .setup(SetupOptions::new(
            "bench_tasks",
            "bench",
            Arc::new(InMemoryStorage::new()),
        ))
        .unwrap();
    entity
}

fn entry(i: u64) -> Properties {
    props! {
        "taskId" => format!("task-{i:08}"),
        "provisionerId" => "bench-provisioner",
        "workerType" => "bench-worker",
        "retries" => 0,
    }
}

fn bench_calculate_id(c: &mut Criterion) {
    let entity = bound_entity();
    let e = props! {
        "taskId" => "a_b~c!d é",
        "provisionerId" => "p",
        "workerType" => "w",
        "retries" => 0,
    };
    c.bench_function("keys/calculate_id", |b| {
        b.iter(|| entity.calculate_id(&e).unwrap());
    });
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");
    group.throughput(Throughput::Elements(1));

    let entity = bound_entity();
    let mut next = 0u64;
    group.bench_function("insert", |b| {
        b.iter_batched(
            || {
                next += 1;
                entry(next)
            },
            |e| entity.create(&e, false).unwrap(),
            BatchSize::SmallInput,
        );
    });

    let entity = bound_entity();
    let e = entry(0);
    entity.create(&e, false).unwrap();
    group.bench_function("overwrite", |b| {
        b.iter(|| entity.create(&e, true).unwrap());
    });

    group.bench_function("conflict", |b| {
        b.iter(|| entity.create(&e, false).unwrap_err());
    });

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let entity = bound_entity();
    for i in 0..1_000 {
        entity.create(&entry(i), false).unwrap();
    }
    let keys = props! { "taskId" => "task-00000500" };

    c.bench_function("load/hit", |b| {
        b.iter(|| entity.load(&keys).unwrap().unwrap());
    });
}

fn bench_scan(c: &mut Criterion) {
    let entity = bound_entity();
    for i in 0..1_000 {
        entity.create(&entry(i), false).unwrap();
    }
    let options = ScanOptions::new().limit(100);

    c.bench_function("scan/page_of_100", |b| {
        b.iter(|| entity.scan(None, &options).unwrap());
    });
}

criterion_group!(benches, bench_calculate_id, bench_create, bench_load, bench_scan);
criterion_main!(benches);
