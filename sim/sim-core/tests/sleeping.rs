//! Bodies falling asleep, staying asleep and being woken.

mod common;

use common::{ground, run, world, RecordingOwner};
use nalgebra::{Point3, Vector3};
use sim_core::{PhysicsConfig, Pose, Shape};

/// An idle body sleeps once it has been still for the configured time.
#[test]
fn idle_body_falls_asleep_and_wakes_on_demand() {
    let mut w = world(PhysicsConfig::default().zero_gravity());
    let ball = w
        .create_dynamic_body(Shape::sphere(0.5, 1.0).expect("ball"), None)
        .expect("dynamic");
    let control = w.control(ball).expect("control");

    // 0.8 s at 120 Hz is 96 substeps.
    run(&mut w, 90);
    assert!(!control.is_sleeping());
    run(&mut w, 30);
    assert!(control.is_sleeping());
    assert_eq!(w.last_stats().bodies_asleep, 1);

    control.add_linear_velocity(Vector3::x());
    assert!(!control.is_sleeping());
    run(&mut w, 1);
    assert_eq!(w.last_stats().bodies_asleep, 0);
    assert!(w.body(ball).expect("body").center_of_mass().x > 0.0);

    control.set_linear_velocity(Vector3::zeros());
    run(&mut w, 120);
    assert!(control.is_sleeping());
    control.force_wake();
    assert!(!control.is_sleeping());
    run(&mut w, 1);
    assert!(!control.is_sleeping(), "the sleep timer restarts on wake");
}

/// A sleeping body on the ground stays put and keeps its contact.
#[test]
fn resting_body_sleeps_in_place() {
    let mut w = world(PhysicsConfig::default());
    let ground = ground(&mut w);
    let owner = RecordingOwner::at(0.0, 0.5, 0.0);
    let crate_box = w
        .create_dynamic_body(
            Shape::cuboid(Vector3::repeat(0.5), 2.0).expect("box"),
            owner.handle(),
        )
        .expect("dynamic");

    run(&mut w, 150);
    let body = w.body(crate_box).expect("body");
    assert!(body.is_sleeping());
    let rested = body.center_of_mass();
    let persisted = owner.persisted();

    run(&mut w, 240);
    let body = w.body(crate_box).expect("body");
    assert!(body.is_sleeping());
    assert_eq!(body.center_of_mass(), rested);
    assert_eq!(body.touching().collect::<Vec<_>>(), vec![ground]);
    assert_eq!(owner.stops(), 0);
    // Sleeping pairs are not re-tested.
    assert_eq!(owner.persisted(), persisted);
    assert_eq!(w.last_stats().pairs_tested, 0);
}

/// A moving body that runs into a sleeper wakes it.
#[test]
fn moving_partner_wakes_sleeper() {
    let mut w = world(PhysicsConfig::default().zero_gravity());
    let sleeper = w
        .create_dynamic_body(Shape::sphere(0.5, 1.0).expect("ball"), None)
        .expect("dynamic");
    run(&mut w, 120);
    let sleeper_control = w.control(sleeper).expect("control");
    assert!(sleeper_control.is_sleeping());

    let striker = w
        .create_dynamic_body(Shape::sphere(0.5, 1.0).expect("ball"), None)
        .expect("dynamic");
    let striker_control = w.control(striker).expect("control");
    striker_control.set_pose(Pose::from_position(Point3::new(-3.0, 0.0, 0.0)));
    striker_control.set_linear_velocity(Vector3::new(2.0, 0.0, 0.0));

    let mut woke_at = None;
    for step in 0..200 {
        w.step();
        if !sleeper_control.is_sleeping() {
            woke_at = Some(step);
            break;
        }
    }
    // Contact starts after about one second of travel.
    let step = woke_at.expect("sleeper never woke");
    assert!((110..=125).contains(&step), "woke at step {step}");
    assert_eq!(
        w.body(sleeper).expect("body").touching().collect::<Vec<_>>(),
        vec![striker]
    );
}

/// With sleeping disabled nothing ever sleeps.
#[test]
fn sleeping_can_be_disabled() {
    let mut w = world(PhysicsConfig::default().zero_gravity().without_sleeping());
    let ball = w
        .create_dynamic_body(Shape::sphere(0.5, 1.0).expect("ball"), None)
        .expect("dynamic");

    run(&mut w, 300);
    assert!(!w.body(ball).expect("body").is_sleeping());
    assert_eq!(w.last_stats().bodies_asleep, 0);
}

/// The sleep threshold is per unit mass: a heavy and a light body moving
/// at the same speed fall asleep on the same substep.
#[test]
fn sleep_threshold_ignores_mass() {
    let mut w = world(PhysicsConfig::default().zero_gravity());
    let threshold = w.config().sleep.energy_threshold;
    let mut spawn = |mass: f64, x: f64, speed: f64| {
        let handle = w
            .create_dynamic_body(Shape::sphere(0.5, mass).expect("ball"), None)
            .expect("dynamic");
        let control = w.control(handle).expect("control");
        control.set_pose(Pose::from_position(Point3::new(x, 0.0, 0.0)));
        control.set_linear_velocity(Vector3::new(0.0, 0.0, speed));
        control
    };
    // Just under and just over the threshold: 0.5 * v^2 against J/kg.
    let slow = (1.5 * threshold).sqrt();
    let fast = (2.5 * threshold).sqrt();
    let light = spawn(1.0, -10.0, slow);
    let heavy = spawn(1000.0, 10.0, slow);
    let heavy_fast = spawn(1000.0, 30.0, fast);

    run(&mut w, 90);
    assert!(!light.is_sleeping());
    assert!(!heavy.is_sleeping());
    run(&mut w, 30);
    assert!(light.is_sleeping());
    assert!(heavy.is_sleeping());
    assert!(!heavy_fast.is_sleeping());
}
