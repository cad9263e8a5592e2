//! Shared fixtures for the integration tests.
//!
//! Every pipeline test runs on the recording backend, so no GPU is needed.

#![allow(dead_code)]

use deferred_engine::backend::RecordingBackend;
use deferred_engine::resources::{Material, Mesh};
use deferred_engine::scene::{Camera, GeometryNode, Light, NodeId, Transform};
use deferred_engine::{DeferredConfig, Engine};
use glam::Vec3;

pub const WIDTH: u32 = 48;
pub const HEIGHT: u32 = 32;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Engine on a fresh recording backend
pub fn engine(config: DeferredConfig) -> Engine<RecordingBackend> {
    init_logging();
    Engine::new(RecordingBackend::new(WIDTH, HEIGHT), config).expect("engine creation")
}

/// Add a unit quad in front of the camera, lit by `lights` point lights
pub fn lit_quad(engine: &mut Engine<RecordingBackend>, lights: usize) -> NodeId {
    let mesh = engine.add_mesh(Mesh::unit_quad());
    let material = engine.add_material(Material::plastic(Vec3::new(0.8, 0.2, 0.2)));

    let scene = engine.scene_mut();
    let root = scene.root();
    let quad = scene
        .add_geometry(
            root,
            "quad",
            GeometryNode::new(mesh, material),
            Transform::from_position(Vec3::new(-0.5, -0.5, 0.0)),
        )
        .expect("add quad");
    for i in 0..lights {
        scene
            .add_light(
                root,
                &format!("light {}", i),
                Light::point(Vec3::ONE),
                Transform::from_position(Vec3::new(i as f32 * 0.25, 1.0, 2.0)),
            )
            .expect("add light");
    }

    let mut camera = Camera::new(Vec3::new(0.0, 0.0, 3.0));
    camera.look_at(Vec3::ZERO, Vec3::Y);
    scene.camera = camera;
    quad
}

/// Cube with every one of its twelve edges marked as a crease
pub fn fully_creased_cube() -> Mesh {
    #[rustfmt::skip]
    let creases = vec![
        [0, 1], [1, 2], [2, 3], [3, 0],
        [4, 5], [5, 6], [6, 7], [7, 4],
        [0, 4], [1, 5], [2, 6], [3, 7],
    ];
    Mesh::cube().with_creases(creases).expect("cube creases")
}

pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}
