//! Routing benchmarks.
//!
//! Run with: `cargo bench -p portico-router`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use portico_core::Method;
use portico_router::RouteTable;

fn build_table(num_routes: usize) -> RouteTable<usize> {
    let mut table = RouteTable::new();
    let auth = ["web", "auth"];

    for i in 0..num_routes / 3 {
        table
            .register(Method::Get, &format!("/admin/resource{i}"), "", auth, i)
            .unwrap();
    }
    for i in 0..num_routes / 3 {
        table
            .register(Method::Get, &format!("/admin/resource{i}/{{record}}"), "", auth, i)
            .unwrap();
    }
    for i in 0..num_routes / 3 {
        table
            .register(
                Method::Get,
                &format!("/admin/team/{{team}}/resource{i}/{{record}}/edit"),
                "",
                auth,
                i,
            )
            .unwrap();
    }
    table
}

fn bench_literal_match(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("literal_match", |b| {
        b.iter(|| black_box(table.match_route(Method::Get, "/admin/resource20").is_ok()));
    });
}

fn bench_param_match(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("param_match", |b| {
        b.iter(|| black_box(table.match_route(Method::Get, "/admin/resource25/12345").is_ok()));
    });
}

fn bench_nested_param_match(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("nested_param_match", |b| {
        b.iter(|| {
            black_box(
                table
                    .match_route(Method::Get, "/admin/team/acme/resource10/12345/edit")
                    .is_ok(),
            )
        });
    });
}

fn bench_miss(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("miss", |b| {
        b.iter(|| black_box(table.match_route(Method::Get, "/admin/nonexistent/path/x").is_err()));
    });
}

fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("scaling");

    for num_routes in [10, 50, 100, 500, 1000] {
        let table = build_table(num_routes);

        group.bench_with_input(
            BenchmarkId::new("last_param_route", num_routes),
            &num_routes,
            |b, &n| {
                let path = format!("/admin/resource{}/7", n / 3 - 1);
                b.iter(|| black_box(table.match_route(Method::Get, &path).is_ok()));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_literal_match,
    bench_param_match,
    bench_nested_param_match,
    bench_miss,
    bench_scaling
);
criterion_main!(benches);
