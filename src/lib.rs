//! Deferred Engine - A render graph-based deferred shading renderer
//!
//! Scenes are rendered in four graph passes per view: geometry into a
//! G-buffer, screen-space gradients, a fullscreen lighting resolve and a
//! final post-processing pass.
//!
//! # Features
//! - Phong and toon shading with gradient outlines
//! - Shadow mapping with percentage-closer filtering
//! - Static environment maps and per-frame dynamic cube maps for reflections
//! - Bloom and raw G-buffer channel previews
//! - Catmull-Clark and Loop subdivision over a half-edge mesh
//! - A headless recording backend for tests; wgpu for windows

pub mod backend;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod subdivision;
#[cfg(feature = "wgpu-backend")]
pub mod window;

pub use engine::Engine;
pub use error::{FrameStatus, RenderError, RenderResult};
pub use pipeline::{BloomSettings, DeferredConfig, GBufferChannel, ShadowSettings};
pub use subdivision::{subdivide, Scheme};

#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;
#[cfg(feature = "wgpu-backend")]
pub use window::Window;

/// Configuration for initializing the graphics engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    pub renderer: DeferredConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Engine".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            renderer: DeferredConfig::default(),
        }
    }
}
