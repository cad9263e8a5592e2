//! Per-draw uniform buffers
//!
//! Every draw of a sub-pass gets its own slot so that writes recorded for
//! later draws never overwrite data an earlier draw still reads. Slots grow
//! on demand and are reused by the next sub-pass.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::{GpuBindGroup, GpuBuffer};
use crate::error::RenderResult;

#[derive(Debug)]
struct UniformSlot {
    buffer: GpuBuffer,
    bind_group: GpuBindGroup,
}

/// Growable set of equally sized uniform buffers with their bind groups
#[derive(Debug)]
pub struct UniformPool {
    label: &'static str,
    size: u64,
    slots: Vec<UniformSlot>,
}

impl UniformPool {
    pub fn new(label: &'static str, size: u64) -> Self {
        Self {
            label,
            size,
            slots: Vec::new(),
        }
    }

    /// Write `bytes` into slot `index` and return its bind group
    pub fn write(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layout: BindGroupLayoutHandle,
        index: usize,
        bytes: &[u8],
    ) -> RenderResult<BindGroupHandle> {
        while self.slots.len() <= index {
            let buffer = GpuBuffer::new(
                backend,
                &BufferDescriptor {
                    label: Some(format!("{} {}", self.label, self.slots.len())),
                    size: self.size,
                    usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                },
            )?;
            let bind_group = GpuBindGroup::new(backend, layout, &[(0, BindGroupEntry::Buffer(buffer.handle()))])?;
            self.slots.push(UniformSlot { buffer, bind_group });
        }

        let slot = &self.slots[index];
        backend.write_buffer(slot.buffer.handle(), 0, bytes);
        Ok(slot.bind_group.handle())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_slots_grow_and_are_reused() {
        let mut backend = RecordingBackend::new(8, 8);
        let layout = backend
            .create_bind_group_layout(&[BindGroupLayoutEntry::uniform(0, ShaderStageFlags::VERTEX)])
            .unwrap();
        let mut pool = UniformPool::new("object", 16);

        let first = pool.write(&mut backend, layout, 0, &[1; 16]).unwrap();
        let third = pool.write(&mut backend, layout, 2, &[3; 16]).unwrap();
        assert_eq!(pool.len(), 3);
        assert_ne!(first, third);

        let reused = pool.write(&mut backend, layout, 0, &[7; 16]).unwrap();
        assert_eq!(first, reused);
        assert_eq!(pool.len(), 3);
        assert_eq!(backend.live_buffer_count(), 3);
    }
}
