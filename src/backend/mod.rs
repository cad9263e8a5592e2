//! Backend abstraction layer
//!
//! Passes record through the object-safe [`GraphicsBackend`] trait. The wgpu
//! backend drives a window; the recording backend runs headless in tests.

pub mod deferred;
pub mod recording;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use deferred::{DeferredDestructor, GpuBindGroup, GpuBuffer, GpuTexture, GpuTextureView};
pub use recording::{RecordedCommand, RecordingBackend};
pub use traits::*;
pub use types::*;
