//! Interactive viewer
//!
//! Renders a small scene with a subdivided solid, a mirror with a dynamic
//! reflection probe, an emissive marker and two lights.
//!
//! Keys: `1`-`6` preview a G-buffer channel, `0` returns to the lit image.
//!
//! ```bash
//! cargo run --example viewer -- --scheme loop --levels 3 --toon
//! ```

use std::time::Instant;

use clap::Parser;
use deferred_engine::resources::{BlurKernel, CubeMapData, Material, Mesh};
use deferred_engine::scene::{Camera, GeometryNode, Light, Transform};
use deferred_engine::{window, DeferredConfig, EngineConfig, Scheme};
use glam::{Quat, Vec3};
use winit::keyboard::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliScheme {
    /// Quads; works on any mesh of triangles or quads
    #[default]
    #[value(name = "catmull-clark")]
    CatmullClark,
    /// Triangles only
    Loop,
}

impl From<CliScheme> for Scheme {
    fn from(cli: CliScheme) -> Self {
        match cli {
            CliScheme::CatmullClark => Scheme::CatmullClark,
            CliScheme::Loop => Scheme::Loop,
        }
    }
}

/// Deferred renderer viewer
#[derive(Parser, Debug)]
#[command(name = "viewer", about = "Deferred shading demo scene")]
struct Args {
    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Disable vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Subdivision scheme applied to the center solid
    #[arg(long, value_enum, default_value_t = CliScheme::default())]
    scheme: CliScheme,

    /// Subdivision levels for the center solid
    #[arg(long, default_value_t = 2)]
    levels: u32,

    #[arg(long)]
    bloom: bool,

    #[arg(long)]
    toon: bool,

    /// Fixed shadow map size; follows the window when omitted
    #[arg(long)]
    shadow_resolution: Option<u32>,

    /// Cube map resolution of the mirror probe
    #[arg(long, default_value_t = 128)]
    probe_resolution: u32,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        let mut renderer = DeferredConfig {
            enable_bloom: self.bloom,
            toon_shading: self.toon,
            ..Default::default()
        };
        renderer.shadow.resolution = self.shadow_resolution;

        EngineConfig {
            title: "Deferred Engine Viewer".to_string(),
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            renderer,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Starting viewer with {:?}", args);

    let scheme = Scheme::from(args.scheme);
    let levels = args.levels;
    let probe_resolution = args.probe_resolution;
    let start = Instant::now();

    window::run(
        args.engine_config(),
        move |engine| {
            let mut sky = CubeMapData::solid(32, [90, 120, 170, 255]);
            sky.blur(BlurKernel::uniform(5, 2.0))?;
            engine.set_environment(Some(sky));

            let base = match scheme {
                Scheme::CatmullClark => Mesh::cube(),
                Scheme::Loop => Mesh::octahedron(),
            };
            let solid_mesh = engine.add_mesh(base);
            engine.subdivide_mesh(solid_mesh, scheme, levels)?;

            let floor = engine.add_mesh(Mesh::grid(8, 8));
            let mirror = engine.add_mesh(Mesh::cube());
            let marker = engine.add_mesh(Mesh::tetrahedron());

            let plastic = engine.add_material(Material::plastic(Vec3::new(0.8, 0.3, 0.2)));
            let matte = engine.add_material(Material::matte(Vec3::splat(0.6)));
            let chrome = engine.add_material(Material::mirror());
            let glow = engine.add_material(Material::emissive(Vec3::new(1.0, 0.9, 0.4), 1.0));

            let scene = engine.scene_mut();
            let root = scene.root();
            scene.add_geometry(
                root,
                "floor",
                GeometryNode::new(floor, matte),
                Transform::from_position_rotation(
                    Vec3::new(-4.0, -1.0, 4.0),
                    Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
                )
                .with_scale(8.0),
            )?;
            scene.add_geometry(
                root,
                "solid",
                GeometryNode::new(solid_mesh, plastic),
                Transform::default(),
            )?;
            scene.add_geometry(
                root,
                "mirror",
                GeometryNode::new(mirror, chrome).with_probe(probe_resolution),
                Transform::from_position(Vec3::new(2.5, 0.0, -1.0)),
            )?;
            scene.add_geometry(
                root,
                "marker",
                GeometryNode::new(marker, glow),
                Transform::from_position(Vec3::new(-2.0, 0.5, 1.0)).with_scale(0.4),
            )?;
            scene.add_light(
                root,
                "sun",
                Light::directional(Vec3::splat(0.8)).with_shadows(true),
                Transform::from_position(Vec3::new(3.0, 6.0, 4.0)).looking_at(Vec3::ZERO, Vec3::Y),
            )?;
            scene.add_light(
                root,
                "fill",
                Light::point(Vec3::new(0.3, 0.4, 0.8)).with_attenuation(1.0, 0.1, 0.02),
                Transform::from_position(Vec3::new(-3.0, 2.0, -2.0)),
            )?;

            let mut camera = Camera::new(Vec3::new(0.0, 2.0, 6.0));
            camera.look_at(Vec3::ZERO, Vec3::Y);
            scene.camera = camera;
            Ok(())
        },
        move |engine, window| {
            for key in window.take_pressed() {
                let channel = match key {
                    KeyCode::Digit1 => Some(0),
                    KeyCode::Digit2 => Some(1),
                    KeyCode::Digit3 => Some(2),
                    KeyCode::Digit4 => Some(3),
                    KeyCode::Digit5 => Some(4),
                    KeyCode::Digit6 => Some(5),
                    KeyCode::Digit0 => {
                        engine.unpreview_gbuffer();
                        None
                    }
                    _ => None,
                };
                if let Some(index) = channel {
                    if let Err(err) = engine.preview_gbuffer(index) {
                        log::warn!("{}", err);
                    }
                }
            }

            if let Some(node) = engine.scene().find("solid") {
                let angle = start.elapsed().as_secs_f32() * 0.5;
                let transform = Transform::from_position_rotation(Vec3::ZERO, Quat::from_rotation_y(angle));
                if let Err(err) = engine.scene_mut().set_transform(node, transform) {
                    log::warn!("{}", err);
                }
            }
        },
    );
}
