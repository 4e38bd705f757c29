use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reachtree::prelude::*;
use reachtree::VertexId;

/// Points in `[0, 100)^2` with a label and a one- and two-hop summary each.
fn dataset(n: u64, seed: u64) -> Vec<SpatialObject> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| {
            let label = rng.gen_range(1..=4);
            let one_hop: Vec<VertexId> = (0..3).map(|_| rng.gen_range(0..n)).collect();
            let two_hop: Vec<VertexId> = (0..6).map(|_| rng.gen_range(0..n)).collect();
            let contribution = PathNeighbors::new()
                .with_neighbors(PnKey::single(rng.gen_range(1..=4)), one_hop)
                .with_neighbors(
                    PnKey::new([rng.gen_range(1..=4), rng.gen_range(1..=4)]),
                    two_hop,
                );
            SpatialObject::new(
                id,
                Geometry::point(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)),
            )
            .with_label(label)
            .with_path_neighbors(contribution)
        })
        .collect()
}

fn config(alpha: f64) -> IndexConfig {
    IndexConfig::default()
        .with_alpha(alpha)
        .with_max_node_references(32)
        .with_max_pn_size(64)
        .with_vertex_count_norm(10_000)
}

fn loaded(alpha: f64, objects: &[SpatialObject]) -> ReachTree {
    let mut tree = ReachTree::new(config(alpha)).unwrap();
    tree.bulk_load(objects.to_vec()).unwrap();
    tree
}

fn benchmark_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("insertion");
    let objects = dataset(5_000, 1);

    for alpha in [1.0, 0.5, 0.0] {
        group.bench_with_input(BenchmarkId::new("insert_5k", alpha), &alpha, |b, &alpha| {
            b.iter(|| {
                let mut tree = ReachTree::new(config(alpha)).unwrap();
                for object in &objects {
                    tree.insert(black_box(object.clone())).unwrap();
                }
                tree
            })
        });
    }

    for alpha in [1.0, 0.5] {
        group.bench_with_input(BenchmarkId::new("bulk_load_5k", alpha), &alpha, |b, &alpha| {
            b.iter(|| loaded(alpha, black_box(&objects)))
        });
    }

    group.finish();
}

fn benchmark_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let objects = dataset(20_000, 2);
    let tree = loaded(0.5, &objects);

    let window = Envelope::new(40.0, 40.0, 45.0, 45.0);
    group.bench_function("range", |b| {
        b.iter(|| tree.range_query(black_box(&window)).unwrap())
    });

    let point = Point::new(50.0, 50.0);
    for k in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("knn", k), &k, |b, &k| {
            b.iter(|| tree.nearest_neighbors(black_box(&point), k).unwrap())
        });
    }

    group.bench_function("distance_join", |b| {
        b.iter(|| tree.distance_join(black_box(0.2), (Some(1), Some(2))).unwrap())
    });

    let mut graph = QueryGraph::new();
    let a = graph.add_vertex(1);
    let b_vertex = graph.add_vertex(2);
    let c_vertex = graph.add_vertex(3);
    graph.add_edge(a, b_vertex).unwrap();
    graph.add_edge(b_vertex, c_vertex).unwrap();
    let pattern = QueryPattern::new(graph)
        .with_range(a, Envelope::new(30.0, 30.0, 50.0, 50.0))
        .unwrap();
    group.bench_function("pattern_range", |b| {
        b.iter(|| tree.pattern_range_query(black_box(&pattern), &AlwaysMatch).unwrap())
    });

    group.finish();
}

criterion_group!(benches, benchmark_insertion, benchmark_queries);
criterion_main!(benches);
