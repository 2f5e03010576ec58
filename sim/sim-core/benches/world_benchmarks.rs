//! Benchmarks for the narrow phase and full world substeps.
//!
//! Run with: cargo bench -p sim-core

#![allow(missing_docs, clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};

use sim_contact::{CollisionDispatcher, CollisionManifold};
use sim_core::{PhysicsConfig, PhysicsWorld, Pose, Shape};

fn placed_box(x: f64, y: f64, angle: f64) -> Shape {
    let mut shape = Shape::cuboid(Vector3::repeat(0.5), 1.0).unwrap();
    shape.provide_transformation(&Isometry3::new(
        Vector3::new(x, y, 0.0),
        Vector3::new(0.0, angle, angle * 0.5),
    ));
    shape
}

fn bench_narrow_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow_phase");
    let dispatcher = CollisionDispatcher::new();
    let mut manifolds: Vec<CollisionManifold> = Vec::with_capacity(8);

    let cases = [
        ("box_box", placed_box(0.0, 0.0, 0.0), placed_box(0.3, 0.8, 0.4)),
        ("sphere_box", Shape::sphere(0.5, 1.0).unwrap(), placed_box(0.0, 0.9, 0.7)),
        (
            "box_plane",
            placed_box(0.0, 0.45, 0.3),
            Shape::plane(Vector3::y(), 0.0).unwrap(),
        ),
    ];

    for (name, a, b) in &cases {
        group.bench_function(*name, |bench| {
            bench.iter(|| {
                manifolds.clear();
                black_box(dispatcher.collide(black_box(a), black_box(b), &mut manifolds))
            });
        });
    }
    group.finish();
}

/// A settled pile: `count` boxes dropped in a grid onto a plane.
fn box_world(count: usize, threads: usize) -> PhysicsWorld {
    let mut world =
        PhysicsWorld::new(PhysicsConfig::default().max_threads(threads).without_sleeping()).unwrap();
    world.create_physics_body(Shape::plane(Vector3::y(), 0.0).unwrap(), None);

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let side = (count as f64).sqrt().ceil() as usize;
    for i in 0..count {
        let handle = world
            .create_dynamic_body(Shape::cuboid(Vector3::repeat(0.5), 1.0).unwrap(), None)
            .unwrap();
        let x = (i % side) as f64 * 1.1;
        let z = (i / side) as f64 * 1.1;
        let y = 0.5 + rng.gen_range(0.0..2.0);
        let tilt = UnitQuaternion::from_euler_angles(0.0, rng.gen_range(0.0..1.0), 0.0);
        world
            .control(handle)
            .unwrap()
            .set_pose(Pose::from_position_rotation(Point3::new(x, y, z), tilt));
    }
    for _ in 0..120 {
        world.step();
    }
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    group.sample_size(20);

    for count in [64, 256] {
        for threads in [1, 4] {
            let mut world = box_world(count, threads);
            group.throughput(Throughput::Elements(count as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{threads}_threads"), count),
                &count,
                |bench, _| bench.iter(|| world.step()),
            );
        }
    }
    group.finish();
}

fn bench_raycast(c: &mut Criterion) {
    let world = box_world(256, 4);
    c.bench_function("raycast_256_boxes", |bench| {
        bench.iter(|| {
            black_box(world.cast_ray(
                black_box(Point3::new(-5.0, 0.5, 3.0)),
                black_box(Point3::new(30.0, 0.5, 3.0)),
            ))
        });
    });
}

criterion_group!(benches, bench_narrow_phase, bench_world_step, bench_raycast);
criterion_main!(benches);
