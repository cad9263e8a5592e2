//! Headless backend that records commands instead of executing them.
//!
//! The recording backend needs no GPU. It tracks every live resource and
//! keeps the command stream of the current frame, so tests can inspect
//! pass ordering, draw counts and resource lifetimes. It also flags any
//! texture that is sampled while attached as a render target of the same
//! pass.

use crate::backend::deferred::DeferredDestructor;
use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

/// A command captured by the recording backend
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginRenderPass {
        label: Option<String>,
        color_views: Vec<TextureViewHandle>,
        depth_view: Option<TextureViewHandle>,
    },
    EndRenderPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
    },
    SetViewport {
        width: f32,
        height: f32,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    WriteBuffer {
        buffer: BufferHandle,
        size: usize,
    },
    Submit,
}

#[derive(Debug, Clone)]
struct ViewRecord {
    /// `None` for the swapchain view
    texture: Option<TextureHandle>,
}

#[derive(Debug)]
struct OpenPass {
    label: String,
    attached: HashSet<TextureHandle>,
    color_views: Vec<TextureViewHandle>,
}

/// Recording backend
#[derive(Debug)]
pub struct RecordingBackend {
    width: u32,
    height: u32,
    next_id: u64,
    destructor: Arc<DeferredDestructor>,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    views: HashMap<u64, ViewRecord>,
    samplers: HashSet<u64>,
    layouts: HashSet<u64>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    pipelines: HashMap<u64, Option<String>>,

    swapchain_view: Option<TextureViewHandle>,
    commands: Vec<RecordedCommand>,
    open_pass: Option<OpenPass>,
    written_views: HashSet<TextureViewHandle>,
    aliasing_violations: Vec<String>,
    frames_presented: u32,
    frames_aborted: u32,

    pending_error: Option<BackendError>,
    pending_frame_error: Option<BackendError>,
    failing_pipeline: Option<String>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            next_id: 1,
            destructor: Arc::new(DeferredDestructor::new()),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashSet::new(),
            layouts: HashSet::new(),
            bind_groups: HashMap::new(),
            pipelines: HashMap::new(),
            swapchain_view: None,
            commands: Vec::new(),
            open_pass: None,
            written_views: HashSet::new(),
            aliasing_violations: Vec::new(),
            frames_presented: 0,
            frames_aborted: 0,
            pending_error: None,
            pending_frame_error: None,
            failing_pipeline: None,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Commands recorded since the last `begin_frame`
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Labels of the render passes recorded this frame, in order
    pub fn render_pass_labels(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::BeginRenderPass { label, .. } => {
                    Some(label.clone().unwrap_or_default())
                }
                _ => None,
            })
            .collect()
    }

    /// Number of draw calls recorded inside passes whose label starts with `prefix`
    pub fn draw_count(&self, prefix: &str) -> usize {
        let mut inside = false;
        let mut count = 0;
        for cmd in &self.commands {
            match cmd {
                RecordedCommand::BeginRenderPass { label, .. } => {
                    inside = label.as_deref().is_some_and(|l| l.starts_with(prefix));
                }
                RecordedCommand::EndRenderPass => inside = false,
                RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } if inside => {
                    count += 1
                }
                _ => {}
            }
        }
        count
    }

    /// Whether any draw landed in a pass that had `view` attached
    pub fn was_written(&self, view: TextureViewHandle) -> bool {
        self.written_views.contains(&view)
    }

    pub fn swapchain_view(&self) -> Option<TextureViewHandle> {
        self.swapchain_view
    }

    pub fn aliasing_violations(&self) -> &[String] {
        &self.aliasing_violations
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_bind_group_count(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn frames_presented(&self) -> u32 {
        self.frames_presented
    }

    pub fn frames_aborted(&self) -> u32 {
        self.frames_aborted
    }

    /// Report `error` from the next `check_errors`
    pub fn inject_error(&mut self, error: BackendError) {
        self.pending_error = Some(error);
    }

    /// Fail the next `begin_frame` with `error`
    pub fn inject_frame_error(&mut self, error: BackendError) {
        self.pending_frame_error = Some(error);
    }

    /// Fail pipeline creation for labels containing `pattern`
    pub fn fail_pipelines_matching(&mut self, pattern: &str) {
        self.failing_pipeline = Some(pattern.to_string());
    }

    fn record(&mut self, command: RecordedCommand) {
        log::trace!("RecordingBackend: {:?}", command);
        self.commands.push(command);
    }
}

impl GraphicsBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "Recording Backend"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        if let Some(err) = self.pending_frame_error.take() {
            return Err(err);
        }
        self.collect_garbage();
        self.commands.clear();
        self.written_views.clear();

        let id = self.allocate_id();
        self.views.insert(id, ViewRecord { texture: None });
        let view = TextureViewHandle(id);
        self.swapchain_view = Some(view);

        Ok(FrameContext {
            swapchain_view: view,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.record(RecordedCommand::Submit);
        if let Some(view) = self.swapchain_view.take() {
            self.views.remove(&view.0);
        }
        self.frames_presented += 1;
        Ok(())
    }

    fn abort_frame(&mut self) {
        self.open_pass = None;
        if let Some(view) = self.swapchain_view.take() {
            self.views.remove(&view.0);
        }
        self.frames_aborted += 1;
    }

    fn submit(&mut self) {
        self.record(RecordedCommand::Submit);
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn check_errors(&mut self) -> BackendResult<()> {
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn destructor(&self) -> Arc<DeferredDestructor> {
        Arc::clone(&self.destructor)
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "RecordingBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let id = self.allocate_id();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "RecordingBackend: creating buffer {:?} with {} bytes",
            desc.label,
            data.len()
        );
        let id = self.allocate_id();
        self.buffers.insert(id, data.to_vec());
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(contents) = self.buffers.get_mut(&buffer.0) {
            let start = offset as usize;
            let end = start + data.len();
            if contents.len() < end {
                contents.resize(end, 0);
            }
            contents[start..end].copy_from_slice(data);
        }
        self.record(RecordedCommand::WriteBuffer {
            buffer,
            size: data.len(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{}x{})",
            desc.label,
            desc.width,
            desc.height,
            desc.array_layers
        );
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::TextureCreationFailed("Texture not found".into()))?;
        let layers = desc.array_layer_count.unwrap_or(1);
        if desc.base_array_layer + layers > tex.array_layers {
            return Err(BackendError::TextureCreationFailed(format!(
                "view layers {}..{} exceed {} layers",
                desc.base_array_layer,
                desc.base_array_layer + layers,
                tex.array_layers
            )));
        }
        let id = self.allocate_id();
        self.views.insert(
            id,
            ViewRecord {
                texture: Some(texture),
            },
        );
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, layer: u32, data: &[u8]) {
        if let Some(desc) = self.textures.get(&texture.0) {
            let expected = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
            if layer >= desc.array_layers || data.len() != expected {
                log::warn!(
                    "RecordingBackend: bad texture upload to {:?} layer {} ({} bytes, expected {})",
                    desc.label,
                    layer,
                    data.len(),
                    expected
                );
            }
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("RecordingBackend: creating sampler {:?}", desc.label);
        let id = self.allocate_id();
        self.samplers.insert(id);
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.allocate_id();
        self.layouts.insert(id);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        if !self.layouts.contains(&layout.0) {
            return Err(BackendError::PipelineCreationFailed(
                "Layout not found".into(),
            ));
        }
        for (binding, entry) in entries {
            let live = match entry {
                BindGroupEntry::Buffer(b) => self.buffers.contains_key(&b.0),
                BindGroupEntry::Texture(v) => self.views.contains_key(&v.0),
                BindGroupEntry::Sampler(s) => self.samplers.contains(&s.0),
            };
            if !live {
                return Err(BackendError::PipelineCreationFailed(format!(
                    "binding {} references a destroyed resource",
                    binding
                )));
            }
        }
        let id = self.allocate_id();
        self.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        if let (Some(pattern), Some(label)) = (&self.failing_pipeline, &desc.label) {
            if label.contains(pattern.as_str()) {
                return Err(BackendError::ShaderCreationFailed(format!(
                    "{}: injected compile failure",
                    label
                )));
            }
        }
        if let Some(missing) = desc
            .bind_group_layouts
            .iter()
            .find(|layout| !self.layouts.contains(&layout.0))
        {
            return Err(BackendError::PipelineCreationFailed(format!(
                "unknown bind group layout {:?}",
                missing
            )));
        }
        let id = self.allocate_id();
        self.pipelines.insert(id, desc.label.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        let color_views: Vec<_> = desc.color_attachments.iter().map(|a| a.view).collect();
        let depth_view = desc.depth_stencil_attachment.as_ref().map(|a| a.view);
        let attached = color_views
            .iter()
            .chain(depth_view.iter())
            .filter_map(|v| self.views.get(&v.0).and_then(|r| r.texture))
            .collect();

        self.open_pass = Some(OpenPass {
            label: desc.label.clone().unwrap_or_default(),
            attached,
            color_views: color_views.clone(),
        });
        self.record(RecordedCommand::BeginRenderPass {
            label: desc.label.clone(),
            color_views,
            depth_view,
        });
    }

    fn end_render_pass(&mut self) {
        self.open_pass = None;
        self.record(RecordedCommand::EndRenderPass);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(RecordedCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if let (Some(pass), Some(entries)) = (&self.open_pass, self.bind_groups.get(&bind_group.0)) {
            for (binding, entry) in entries {
                let BindGroupEntry::Texture(view) = entry else {
                    continue;
                };
                let texture = self.views.get(&view.0).and_then(|r| r.texture);
                if texture.is_some_and(|t| pass.attached.contains(&t)) {
                    self.aliasing_violations.push(format!(
                        "{}: binding {} samples an attached render target",
                        pass.label, binding
                    ));
                }
            }
        }
        self.record(RecordedCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, _format: IndexFormat) {
        self.record(RecordedCommand::SetIndexBuffer { buffer });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record(RecordedCommand::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if let Some(pass) = &self.open_pass {
            self.written_views.extend(pass.color_views.iter().copied());
        }
        self.record(RecordedCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        if let Some(pass) = &self.open_pass {
            self.written_views.extend(pass.color_views.iter().copied());
        }
        self.record(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.views.remove(&view.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }
}
