//! End-to-end pipeline behaviour on the recording backend.

mod common;

use rstest::rstest;

use common::{engine, init_logging, lit_quad, HEIGHT, WIDTH};
use deferred_engine::backend::{BackendError, GraphicsBackend, RecordingBackend};
use deferred_engine::pipeline::{PresentMode, PresentPass};
use deferred_engine::resources::{CubeFace, CubeMapData, Material, Mesh};
use deferred_engine::scene::{GeometryNode, Light, Transform};
use deferred_engine::{DeferredConfig, Engine, FrameStatus, GBufferChannel, RenderError};
use glam::Vec3;

const STATES: [&str; 4] = ["Geometry", "Gradient", "Lighting", "Present"];

fn last_present_mode(engine: &mut Engine<RecordingBackend>) -> Option<PresentMode> {
    engine
        .renderer_mut()
        .graph_mut()
        .find_pass_mut::<PresentPass>()
        .and_then(|pass| pass.last_mode())
}

// ============================================================================
// Lighting stage errors
// ============================================================================

#[test]
fn test_no_lights_records_no_pass() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 0);

    let status = engine.render().unwrap();
    assert_eq!(status, FrameStatus::Skipped(RenderError::NoLights));
    assert!(engine.backend().render_pass_labels().is_empty());
    assert_eq!(engine.backend().draw_count("Lighting"), 0);
    assert_eq!(engine.backend().frames_aborted(), 1);
}

#[rstest]
#[case::over_configured_limit(2, 3, 2)]
#[case::over_shader_array(16, 17, 16)]
fn test_too_many_lights(
    #[case] max_lights: u32,
    #[case] lights: usize,
    #[case] reported_max: usize,
) {
    let mut engine = engine(DeferredConfig {
        max_lights,
        ..Default::default()
    });
    lit_quad(&mut engine, lights);

    let status = engine.render().unwrap();
    assert_eq!(
        status,
        FrameStatus::Skipped(RenderError::TooManyLights {
            count: lights,
            max: reported_max,
        })
    );
    assert!(engine.backend().render_pass_labels().is_empty());
}

#[test]
fn test_message_names_both_counts() {
    let err = RenderError::TooManyLights { count: 9, max: 8 };
    let message = err.to_string();
    assert!(message.contains('9') && message.contains('8'), "{}", message);
}

// ============================================================================
// Frame structure
// ============================================================================

#[test]
fn test_lit_quad_runs_every_state() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 1);

    assert_eq!(engine.render().unwrap(), FrameStatus::Presented);

    let backend = engine.backend();
    assert_eq!(backend.render_pass_labels(), STATES.to_vec());
    assert_eq!(backend.draw_count("Geometry"), 1);
    assert_eq!(backend.draw_count("Lighting"), 1);

    let targets = engine.renderer().targets().unwrap();
    assert!(backend.was_written(targets.lit.color_view(0).unwrap()));
    assert!(backend.was_written(targets.gradient.color_view(0).unwrap()));
    assert!(backend.aliasing_violations().is_empty());
    assert_eq!(backend.frames_presented(), 1);
}

#[rstest]
#[case::blit(false, None, PresentMode::Blit)]
#[case::bloom(true, None, PresentMode::Bloom)]
#[case::preview(false, Some(4), PresentMode::Preview(GBufferChannel::MaterialParams))]
#[case::bloom_wins_over_preview(true, Some(1), PresentMode::Bloom)]
fn test_present_branch(
    #[case] bloom: bool,
    #[case] preview: Option<usize>,
    #[case] expected: PresentMode,
) {
    let mut engine = engine(DeferredConfig {
        enable_bloom: bloom,
        ..Default::default()
    });
    lit_quad(&mut engine, 1);
    if let Some(index) = preview {
        engine.preview_gbuffer(index).unwrap();
    }

    assert!(engine.render().unwrap().is_presented());
    assert_eq!(last_present_mode(&mut engine), Some(expected));

    let labels = engine.backend().render_pass_labels();
    assert_eq!(labels.iter().any(|l| l == "Bloom"), bloom);
    assert!(engine.backend().aliasing_violations().is_empty());
}

#[test]
fn test_shadow_sub_pass_runs_first() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 0);
    let root = engine.scene().root();
    engine
        .scene_mut()
        .add_light(
            root,
            "sun",
            Light::directional(Vec3::ONE).with_shadows(true),
            Transform::from_position(Vec3::new(0.0, 0.0, 4.0)),
        )
        .unwrap();

    assert!(engine.render().unwrap().is_presented());
    let labels = engine.backend().render_pass_labels();
    assert_eq!(labels[0], "Shadow");
    assert_eq!(&labels[1..], STATES);
    assert_eq!(engine.renderer().shadow_resolution(), Some(1024));
}

#[test]
fn test_viewport_sized_shadow_follows_resize() {
    let mut config = DeferredConfig::default();
    config.shadow.resolution = None;
    let mut engine = engine(config);
    lit_quad(&mut engine, 0);
    let root = engine.scene().root();
    engine
        .scene_mut()
        .add_light(
            root,
            "spot",
            Light::point(Vec3::ONE).with_shadows(true),
            Transform::from_position(Vec3::new(0.0, 0.0, 4.0)),
        )
        .unwrap();

    engine.render().unwrap();
    assert_eq!(engine.renderer().shadow_resolution(), Some(WIDTH.max(HEIGHT)));

    engine.resize(80, 60).unwrap();
    engine.render().unwrap();
    assert_eq!(engine.renderer().shadow_resolution(), Some(80));
}

// ============================================================================
// Reflection probes
// ============================================================================

#[test]
fn test_probe_faces_render_before_main_view() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 1);
    engine.set_environment(Some(CubeMapData::solid(4, [40, 60, 90, 255])));
    let cube = engine.add_mesh(Mesh::cube());
    let mirror = engine.add_material(Material::mirror());
    let root = engine.scene().root();
    let probe = engine
        .scene_mut()
        .add_geometry(
            root,
            "mirror",
            GeometryNode::new(cube, mirror).with_probe(8),
            Transform::from_position(Vec3::new(1.5, 0.0, 0.0)),
        )
        .unwrap();

    assert!(engine.render().unwrap().is_presented());

    let backend = engine.backend();
    // Six faces plus the main view, each running every state
    assert_eq!(backend.draw_count("Lighting"), 7);
    assert_eq!(backend.render_pass_labels().len(), 7 * STATES.len());
    let cube_map = engine.renderer().cube_map(probe).unwrap();
    for face in CubeFace::ALL {
        assert!(backend.was_written(cube_map.face_view(face)));
    }
    assert!(backend.aliasing_violations().is_empty());
}

#[test]
fn test_probes_beyond_limit_are_ignored() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 1);
    let cube = engine.add_mesh(Mesh::cube());
    let mirror = engine.add_material(Material::mirror());
    let root = engine.scene().root();
    let probes: Vec<_> = (0..5)
        .map(|i| {
            engine
                .scene_mut()
                .add_geometry(
                    root,
                    &format!("mirror {}", i),
                    GeometryNode::new(cube, mirror).with_probe(4),
                    Transform::from_position(Vec3::new(i as f32, 2.0, 0.0)),
                )
                .unwrap()
        })
        .collect();

    assert!(engine.render().unwrap().is_presented());
    assert_eq!(engine.backend().draw_count("Lighting"), 4 * 6 + 1);
    assert!(engine.renderer().cube_map(probes[3]).is_some());
    assert!(engine.renderer().cube_map(probes[4]).is_none());
}

// ============================================================================
// Viewport
// ============================================================================

#[test]
fn test_resize_recreates_targets() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 1);
    engine.render().unwrap();
    let before = engine.renderer().targets().unwrap().lit.color_view(0).unwrap();

    engine.resize(96, 64).unwrap();
    let targets = engine.renderer().targets().unwrap();
    assert_eq!(targets.size(), (96, 64));
    assert_eq!(targets.gbuffer.size(), (96, 64));
    assert_ne!(targets.lit.color_view(0).unwrap(), before);
    assert_eq!(engine.backend().surface_size(), (96, 64));

    assert!(engine.render().unwrap().is_presented());
}

#[test]
fn test_zero_sized_resize_is_ignored() {
    let mut engine = engine(DeferredConfig::default());
    engine.resize(0, 10).unwrap();
    assert_eq!(engine.renderer().size(), (WIDTH, HEIGHT));
}

// ============================================================================
// Error taxonomy
// ============================================================================

#[test]
fn test_missing_attribute_skips_frame() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 1);
    let quad = engine.add_mesh(Mesh::unit_quad());
    let bumpy = engine.add_material(
        Material::plastic(Vec3::ONE).with_required_attribute("tangent"),
    );
    let root = engine.scene().root();
    engine
        .scene_mut()
        .add_geometry(root, "bumpy", GeometryNode::new(quad, bumpy), Transform::default())
        .unwrap();

    let status = engine.render().unwrap();
    match status {
        FrameStatus::Skipped(RenderError::MissingVertexAttribute { attribute, .. }) => {
            assert_eq!(attribute, "tangent");
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(engine.backend().frames_aborted(), 1);
}

#[test]
fn test_gpu_error_is_fatal() {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 1);
    engine
        .backend_mut()
        .inject_error(BackendError::Validation("bad attachment".into()));

    let err = engine.render().unwrap_err();
    assert!(matches!(err, RenderError::Gpu { ref pass, .. } if pass == "Geometry"));
    assert!(!err.is_recoverable());
}

#[test]
fn test_shader_failure_is_fatal_at_startup() {
    init_logging();
    let mut backend = RecordingBackend::new(WIDTH, HEIGHT);
    backend.fail_pipelines_matching("Lighting");
    let err = Engine::new(backend, DeferredConfig::default()).err().unwrap();
    assert!(matches!(
        err,
        RenderError::Backend(BackendError::ShaderCreationFailed(_))
    ));
    assert!(!err.is_recoverable());
}

#[rstest]
#[case::surface_lost(BackendError::SurfaceLost)]
#[case::surface_outdated(BackendError::SurfaceOutdated)]
fn test_surface_errors_skip_one_frame(#[case] error: BackendError) {
    let mut engine = engine(DeferredConfig::default());
    lit_quad(&mut engine, 1);
    engine.backend_mut().inject_frame_error(error.clone());

    assert_eq!(
        engine.render().unwrap(),
        FrameStatus::Skipped(RenderError::Backend(error))
    );
    assert!(engine.render().unwrap().is_presented());
}
