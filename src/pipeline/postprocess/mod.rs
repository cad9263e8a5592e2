//! Post-processing and presentation
//!
//! The last state of every sub-pass. Exactly one branch runs: bloom when
//! enabled, otherwise a G-buffer channel preview when one is selected for
//! the main view, otherwise a plain blit of the lit image.

mod bloom;
mod present;

pub use bloom::BloomPass;
pub use present::{PresentMode, PresentPass};

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Uniform shared by the post-processing shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PostUniform {
    /// x = bloom intensity, y = blur radius, z = preview channel, w = bloom threshold
    pub params: Vec4,
}

/// Gaussian weights over `-radius..=radius`, sigma = radius / 2
pub const GAUSSIAN_WGSL: &str = r#"
fn gaussian(offset: i32, radius: i32) -> f32 {
    let sigma = max(f32(radius) * 0.5, 0.5);
    let x = f32(offset);
    return exp(-(x * x) / (2.0 * sigma * sigma));
}
"#;
