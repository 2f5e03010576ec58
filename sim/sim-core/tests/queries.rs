//! Ray casts against the world.

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::{world, RecordingOwner};
use nalgebra::{Point3, Vector3};
use sim_core::{PhysicsConfig, Shape};

/// Every boundary crossing is reported, nearest first.
#[test]
fn hits_come_back_sorted_by_distance() {
    let mut w = world(PhysicsConfig::default().zero_gravity());
    // Created far-to-near so arena order differs from distance order.
    let far = w.create_physics_body(
        Shape::sphere(0.5, 1.0).expect("sphere"),
        RecordingOwner::at(5.0, 0.0, 0.0).handle(),
    );
    let near = w.create_physics_body(
        Shape::sphere(0.5, 1.0).expect("sphere"),
        RecordingOwner::at(2.0, 0.0, 0.0).handle(),
    );

    let hits = w.cast_ray(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
    let distances: Vec<f64> = hits.iter().map(|h| h.distance).collect();
    assert_eq!(distances.len(), 4, "hits: {hits:?}");
    for (got, want) in distances.iter().zip([1.5, 2.5, 4.5, 5.5]) {
        assert_relative_eq!(*got, want, epsilon = 1e-9);
    }
    let bodies: Vec<_> = hits.iter().map(|h| h.body).collect();
    assert_eq!(bodies, vec![near, near, far, far]);
    assert_relative_eq!(hits[0].point, Point3::new(1.5, 0.0, 0.0), epsilon = 1e-9);
}

/// A ray that reaches nothing, or stops short, reports nothing.
#[test]
fn misses_are_empty() {
    let mut w = world(PhysicsConfig::default().zero_gravity());
    w.create_physics_body(
        Shape::cuboid(Vector3::repeat(0.5), 1.0).expect("box"),
        RecordingOwner::at(0.0, 0.0, 5.0).handle(),
    );

    assert!(w.cast_ray(Point3::origin(), Point3::new(10.0, 0.0, 0.0)).is_empty());
    assert!(w.cast_ray(Point3::origin(), Point3::new(0.0, 0.0, 4.0)).is_empty());
    assert_eq!(w.cast_ray(Point3::origin(), Point3::new(0.0, 0.0, 10.0)).len(), 2);
}

/// Arguments and results are in owner units and carry the owner.
#[test]
fn ray_uses_owner_units() {
    let mut w = world(PhysicsConfig::default().zero_gravity().sim_scale(2.0));
    let owner = RecordingOwner::at(1.0, 0.0, 0.0);
    let ball = w.create_physics_body(Shape::sphere(0.5, 1.0).expect("sphere"), owner.handle());

    let hits = w.cast_ray(Point3::origin(), Point3::new(5.0, 0.0, 0.0));
    assert_eq!(hits.len(), 2);
    let first = &hits[0];
    assert_eq!(first.body, ball);
    // The sphere's radius is 0.5 simulation units, 0.25 owner units.
    assert_relative_eq!(first.distance, 0.75, epsilon = 1e-9);
    assert_relative_eq!(first.point, Point3::new(0.75, 0.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(hits[1].distance, 1.25, epsilon = 1e-9);

    let hit_owner = first.owner.as_ref().expect("owner");
    let expected: Arc<dyn sim_core::BodyOwner> = owner;
    assert!(Arc::ptr_eq(hit_owner, &expected));
}

/// The ground plane is hit once, and a destroyed body not at all.
#[test]
fn plane_and_destroyed_bodies() {
    let mut w = world(PhysicsConfig::default());
    let ground = common::ground(&mut w);
    let ball = w
        .create_dynamic_body(Shape::sphere(0.5, 1.0).expect("ball"), None)
        .expect("dynamic");
    let control = w.control(ball).expect("control");
    control.set_pose(sim_core::Pose::from_position(Point3::new(0.0, 2.0, 0.0)));
    control.set_linear_velocity(Vector3::zeros());
    assert!(w.body_mut(ball).expect("body").set_gravity_scale(0.0));
    // One substep refreshes the shape at its new pose.
    w.step();

    let down = |w: &sim_core::PhysicsWorld| {
        w.cast_ray(Point3::new(0.0, 5.0, 0.0), Point3::new(0.0, -5.0, 0.0))
    };
    let hits = down(&w);
    let bodies: Vec<_> = hits.iter().map(|h| h.body).collect();
    assert_eq!(bodies, vec![ball, ball, ground]);
    assert_relative_eq!(hits[0].distance, 2.5, epsilon = 1e-9);
    assert_relative_eq!(hits[2].distance, 5.0, epsilon = 1e-9);

    control.destroy();
    let bodies: Vec<_> = down(&w).iter().map(|h| h.body).collect();
    assert_eq!(bodies, vec![ground]);
}
