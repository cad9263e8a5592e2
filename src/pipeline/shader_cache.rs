//! Pipeline caching and fullscreen pipeline helpers
//!
//! Pipelines are compiled on first use and kept for the lifetime of the
//! pass. Compilation failures are returned as `RenderError::Backend` and are
//! never cached, so a later frame retries.

use std::collections::HashMap;
use std::hash::Hash;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::RenderResult;

/// Fullscreen triangle vertex stage shared by every screen-space pass
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}
"#;

/// Pipelines keyed by the state they were compiled for
#[derive(Debug)]
pub struct PipelineCache<K> {
    label: &'static str,
    pipelines: HashMap<K, RenderPipelineHandle>,
}

impl<K: Copy + Eq + Hash + std::fmt::Debug> PipelineCache<K> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            pipelines: HashMap::new(),
        }
    }

    /// Return the pipeline for `key`, compiling it with `create` on a miss
    pub fn get_or_create<F>(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        key: K,
        create: F,
    ) -> RenderResult<RenderPipelineHandle>
    where
        F: FnOnce(K) -> RenderPipelineDescriptor,
    {
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }
        let desc = create(key);
        log::debug!("Compiling {} pipeline for {:?}", self.label, key);
        let pipeline = backend.create_render_pipeline(&desc)?;
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Descriptor for a fullscreen triangle pass
///
/// `fragment_source` is appended to the shared vertex stage and must not
/// redeclare `VertexOutput`.
pub fn fullscreen_pipeline(
    label: String,
    fragment_source: &str,
    fragment_entry: &'static str,
    layouts: Vec<BindGroupLayoutHandle>,
    targets: Vec<ColorTargetState>,
) -> RenderPipelineDescriptor {
    RenderPipelineDescriptor {
        label: Some(label),
        shader_source: format!("{}\n{}", FULLSCREEN_VERTEX_SHADER, fragment_source),
        vertex_entry: "vs_main",
        fragment_entry: Some(fragment_entry),
        vertex_layouts: Vec::new(),
        bind_group_layouts: layouts,
        primitive_topology: PrimitiveTopology::TriangleList,
        front_face: FrontFace::Ccw,
        cull_mode: CullMode::None,
        depth_stencil: None,
        color_targets: targets,
    }
}

/// Record the fullscreen triangle
pub fn draw_fullscreen(backend: &mut dyn GraphicsBackend) {
    backend.draw(0..3, 0..1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::error::RenderError;

    fn desc(label: &str) -> RenderPipelineDescriptor {
        fullscreen_pipeline(
            label.to_string(),
            "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
            "fs_main",
            Vec::new(),
            vec![TextureFormat::Rgba8Unorm.into()],
        )
    }

    #[test]
    fn test_pipeline_is_compiled_once_per_key() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut cache = PipelineCache::new("test");
        let a = cache.get_or_create(&mut backend, 1u32, |_| desc("a")).unwrap();
        let again = cache
            .get_or_create(&mut backend, 1u32, |_| panic!("cached key recompiled"))
            .unwrap();
        let b = cache.get_or_create(&mut backend, 2u32, |_| desc("b")).unwrap();

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
        assert_eq!(backend.pipeline_count(), 2);
    }

    #[test]
    fn test_compile_failure_is_not_cached() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.fail_pipelines_matching("broken");
        let mut cache = PipelineCache::new("test");
        let err = cache
            .get_or_create(&mut backend, 0u32, |_| desc("broken"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Backend(_)));
        assert!(cache.is_empty());
    }
}
