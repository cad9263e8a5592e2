//! Virtual resources for the render graph
//!
//! Graph resources are named slots. The renderer binds a concrete texture
//! view to each slot before every sub-pass, so one compiled graph drives the
//! main view and every cube-map face alike.

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

/// Named texture slot in the graph
#[derive(Debug, Clone)]
pub struct VirtualResource {
    pub id: ResourceId,
    pub name: String,
}

/// How a pass uses a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Read as a texture (sampled or loaded)
    TextureRead,
    /// Write as a color attachment
    RenderTarget,
    /// Depth attachment with depth writes
    DepthWrite,
}

/// Resource access declaration for a pass
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    pub resource: ResourceId,
    pub usage: ResourceUsage,
}

impl ResourceAccess {
    pub fn is_read(&self) -> bool {
        matches!(self.usage, ResourceUsage::TextureRead)
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::RenderTarget | ResourceUsage::DepthWrite
        )
    }
}
