//! Deferred destruction of GPU resources.
//!
//! Commands are executed by the GPU some frames after they are recorded, so
//! a resource dropped on the CPU side may still be referenced by in-flight
//! work. RAII wrappers never destroy their handle directly; they queue it
//! here and the backend destroys it once enough frames have passed.
//!
//! ```text
//! Drop(GpuTexture)  ──queue──▶  frame_queues[frame % MAX_FRAMES_IN_FLIGHT]
//! begin_frame()     ──advance─▶ drain the slot that is about to be reused
//! ```

use crate::backend::traits::*;
use crate::backend::types::{BufferDescriptor, TextureDescriptor, TextureViewDescriptor};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of frames a queued resource survives before it is destroyed.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// A handle pending destruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    TextureView(TextureViewHandle),
    BindGroup(BindGroupHandle),
}

/// Frame-indexed destruction queues shared between a backend and the
/// resource wrappers it hands out.
pub struct DeferredDestructor {
    frame_queues: [Mutex<Vec<DeferredResource>>; MAX_FRAMES_IN_FLIGHT],
    current_frame: AtomicUsize,
}

impl std::fmt::Debug for DeferredDestructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredDestructor")
            .field("current_frame", &self.current_frame())
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

impl DeferredDestructor {
    pub fn new() -> Self {
        Self {
            frame_queues: Default::default(),
            current_frame: AtomicUsize::new(0),
        }
    }

    /// Queue a resource; it is handed back by `advance_frame` once
    /// `MAX_FRAMES_IN_FLIGHT` frames have started.
    pub fn queue(&self, resource: DeferredResource) {
        let frame = self.current_frame.load(Ordering::Relaxed);
        self.frame_queues[frame % MAX_FRAMES_IN_FLIGHT]
            .lock()
            .push(resource);
    }

    /// Start the next frame and return the resources that are now safe to
    /// destroy.
    pub fn advance_frame(&self) -> Vec<DeferredResource> {
        let next = self.current_frame.fetch_add(1, Ordering::SeqCst) + 1;
        self.frame_queues[next % MAX_FRAMES_IN_FLIGHT]
            .lock()
            .drain(..)
            .collect()
    }

    /// Drain every queue regardless of frame timing. Only valid once the
    /// device is idle.
    pub fn flush_all(&self) -> Vec<DeferredResource> {
        self.frame_queues
            .iter()
            .flat_map(|queue| queue.lock().drain(..).collect::<Vec<_>>())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.frame_queues.iter().map(|q| q.lock().len()).sum()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame.load(Ordering::Relaxed)
    }
}

impl Default for DeferredDestructor {
    fn default() -> Self {
        Self::new()
    }
}

/// Texture plus its default view, released through the destructor on drop
#[derive(Debug)]
pub struct GpuTexture {
    handle: TextureHandle,
    view: TextureViewHandle,
    desc: TextureDescriptor,
    destructor: Arc<DeferredDestructor>,
}

impl GpuTexture {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        desc: TextureDescriptor,
        view: &TextureViewDescriptor,
    ) -> BackendResult<Self> {
        let handle = backend.create_texture(&desc)?;
        let destructor = backend.destructor();
        let view = match backend.create_texture_view(handle, view) {
            Ok(view) => view,
            Err(err) => {
                destructor.queue(DeferredResource::Texture(handle));
                return Err(err);
            }
        };
        Ok(Self {
            handle,
            view,
            desc,
            destructor,
        })
    }

    /// Create an additional view, e.g. one cube face as a render target
    pub fn create_view(
        &self,
        backend: &mut dyn GraphicsBackend,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<GpuTextureView> {
        let handle = backend.create_texture_view(self.handle, desc)?;
        Ok(GpuTextureView {
            handle,
            destructor: Arc::clone(&self.destructor),
        })
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn desc(&self) -> &TextureDescriptor {
        &self.desc
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.destructor
            .queue(DeferredResource::TextureView(self.view));
        self.destructor.queue(DeferredResource::Texture(self.handle));
    }
}

/// Extra view onto a `GpuTexture`
#[derive(Debug)]
pub struct GpuTextureView {
    handle: TextureViewHandle,
    destructor: Arc<DeferredDestructor>,
}

impl GpuTextureView {
    pub fn handle(&self) -> TextureViewHandle {
        self.handle
    }
}

impl Drop for GpuTextureView {
    fn drop(&mut self) {
        self.destructor
            .queue(DeferredResource::TextureView(self.handle));
    }
}

/// Buffer released through the destructor on drop
#[derive(Debug)]
pub struct GpuBuffer {
    handle: BufferHandle,
    size: u64,
    destructor: Arc<DeferredDestructor>,
}

impl GpuBuffer {
    pub fn new(backend: &mut dyn GraphicsBackend, desc: &BufferDescriptor) -> BackendResult<Self> {
        let handle = backend.create_buffer(desc)?;
        Ok(Self {
            handle,
            size: desc.size,
            destructor: backend.destructor(),
        })
    }

    pub fn with_data(
        backend: &mut dyn GraphicsBackend,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<Self> {
        let handle = backend.create_buffer_init(desc, data)?;
        Ok(Self {
            handle,
            size: data.len() as u64,
            destructor: backend.destructor(),
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.destructor.queue(DeferredResource::Buffer(self.handle));
    }
}

/// Bind group released through the destructor on drop
#[derive(Debug)]
pub struct GpuBindGroup {
    handle: BindGroupHandle,
    destructor: Arc<DeferredDestructor>,
}

impl GpuBindGroup {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<Self> {
        let handle = backend.create_bind_group(layout, entries)?;
        Ok(Self {
            handle,
            destructor: backend.destructor(),
        })
    }

    pub fn handle(&self) -> BindGroupHandle {
        self.handle
    }
}

impl Drop for GpuBindGroup {
    fn drop(&mut self) {
        self.destructor
            .queue(DeferredResource::BindGroup(self.handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_destructor_frame_cycling() {
        let destructor = DeferredDestructor::new();
        assert_eq!(destructor.current_frame(), 0);
        assert_eq!(destructor.pending_count(), 0);

        for i in 0..MAX_FRAMES_IN_FLIGHT * 2 {
            assert!(destructor.advance_frame().is_empty());
            assert_eq!(destructor.current_frame(), i + 1);
        }
    }

    #[test]
    fn test_resource_survives_frames_in_flight() {
        let destructor = DeferredDestructor::new();
        destructor.queue(DeferredResource::Buffer(BufferHandle(7)));

        for _ in 0..MAX_FRAMES_IN_FLIGHT - 1 {
            assert!(destructor.advance_frame().is_empty());
        }
        assert_eq!(
            destructor.advance_frame(),
            vec![DeferredResource::Buffer(BufferHandle(7))]
        );
        assert_eq!(destructor.pending_count(), 0);
    }

    #[test]
    fn test_buffer_destroyed_after_frames_in_flight() {
        use crate::backend::types::BufferUsage;
        use crate::backend::RecordingBackend;

        let mut backend = RecordingBackend::new(4, 4);
        let desc = BufferDescriptor {
            label: Some("uniform".into()),
            size: 64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        };
        let buffer = GpuBuffer::new(&mut backend, &desc).unwrap();
        let filled = GpuBuffer::with_data(&mut backend, &desc, &[0u8; 16]).unwrap();
        assert_eq!(buffer.size(), 64);
        assert_eq!(filled.size(), 16);
        assert_eq!(backend.live_buffer_count(), 2);

        drop(buffer);
        drop(filled);
        assert_eq!(backend.live_buffer_count(), 2);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            backend.begin_frame().unwrap();
            backend.end_frame().unwrap();
        }
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn test_flush_all_drains_every_frame() {
        let destructor = DeferredDestructor::new();
        destructor.queue(DeferredResource::Texture(TextureHandle(1)));
        destructor.advance_frame();
        destructor.queue(DeferredResource::Texture(TextureHandle(2)));

        assert_eq!(destructor.flush_all().len(), 2);
        assert_eq!(destructor.pending_count(), 0);
    }
}
