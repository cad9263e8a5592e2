//! Per-sub-pass frame data shared by every pass of the graph

use std::collections::HashMap;

use glam::Mat4;

use super::gpu_cache::{GpuMeshCache, GpuTextureCache};
use super::{GBufferChannel, MAX_DYNAMIC_CUBE_MAPS};
use crate::backend::traits::TextureViewHandle;
use crate::backend::types::TextureFormat;
use crate::resources::{Assets, CubeFace, ShadingContext};
use crate::scene::{CollectedLight, DrawItem, NodeId, ViewParams};

/// Which view a sub-pass renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The camera view presented on screen
    Main,
    /// One face of a dynamic reflection probe
    CubeFace { probe: usize, face: CubeFace },
}

/// Environment cube maps visible to the lighting pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvironmentBindings {
    pub static_env: Option<TextureViewHandle>,
    /// Cube views of the dynamic probes, by slot. The probe being rendered
    /// leaves its own slot empty.
    pub dynamic: [Option<TextureViewHandle>; MAX_DYNAMIC_CUBE_MAPS],
}

/// The shadow map rendered for this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowBinding {
    pub view: TextureViewHandle,
    /// World to light clip space
    pub light_view_proj: Mat4,
    pub texel: f32,
}

/// Everything a pass needs to record one sub-pass
pub struct FrameData<'a> {
    pub view: ViewParams,
    pub draws: &'a [DrawItem],
    pub lights: &'a [CollectedLight],
    /// Dynamic cube map slot of every probe node
    pub probe_slots: &'a HashMap<NodeId, usize>,
    pub shading: &'a ShadingContext,
    pub assets: &'a Assets,
    pub meshes: &'a GpuMeshCache,
    pub textures: &'a GpuTextureCache,
    pub environment: EnvironmentBindings,
    pub shadow: Option<ShadowBinding>,
    pub preview: Option<GBufferChannel>,
    pub bloom: bool,
    /// Format of the view bound to the output resource
    pub output_format: TextureFormat,
    pub kind: FrameKind,
}

impl FrameData<'_> {
    /// Environment slot written for the draws of `node`: `2 + k` for a probe
    /// node with dynamic cube map `k`, otherwise the static environment.
    pub fn env_slot(&self, node: NodeId) -> u32 {
        self.probe_slots
            .get(&node)
            .map(|&slot| 2 + slot as u32)
            .unwrap_or(1)
    }

    /// Preview only replaces the lit image of the main view
    pub fn active_preview(&self) -> Option<GBufferChannel> {
        match self.kind {
            FrameKind::Main => self.preview,
            FrameKind::CubeFace { .. } => None,
        }
    }

    /// Eye space of this sub-pass to shadow map clip space
    pub fn shadow_matrix(&self) -> Mat4 {
        self.shadow
            .map(|s| s.light_view_proj * self.view.view.inverse())
            .unwrap_or(Mat4::IDENTITY)
    }
}
