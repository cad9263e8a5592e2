//! Render pass definitions for the render graph

use crate::backend::traits::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::frame::FrameData;
use crate::pipeline::targets::FrameTargets;
use crate::render_graph::resource::*;
use std::any::Any;
use std::collections::HashMap;

/// Unique identifier for a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(pub(crate) u32);

/// Context for declaring pass dependencies
pub struct PassSetupContext<'a> {
    pub(crate) resources: &'a [VirtualResource],
    pub(crate) inputs: &'a mut Vec<ResourceAccess>,
    pub(crate) outputs: &'a mut Vec<ResourceAccess>,
}

impl<'a> PassSetupContext<'a> {
    /// Declare that this pass reads from a resource
    pub fn read(&mut self, resource: ResourceId) {
        self.inputs.push(ResourceAccess {
            resource,
            usage: ResourceUsage::TextureRead,
        });
    }

    /// Declare that this pass writes to a resource
    pub fn write(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.outputs.push(ResourceAccess { resource, usage });
    }

    /// Look up a registered resource by name
    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }
}

/// Context for executing a render pass
pub struct PassExecuteContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub frame: &'a FrameData<'a>,
    pub targets: &'a FrameTargets,
    pub(crate) views: &'a HashMap<ResourceId, TextureViewHandle>,
}

impl<'a> PassExecuteContext<'a> {
    /// Get the view currently bound to a resource
    pub fn texture(&self, resource: ResourceId) -> RenderResult<TextureViewHandle> {
        self.views.get(&resource).copied().ok_or_else(|| {
            RenderError::InvalidAttachment(format!("no view bound to resource {:?}", resource))
        })
    }
}

/// Trait for render passes
pub trait RenderPass: Send + Sync {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Setup phase - declare dependencies
    fn setup(&mut self, ctx: &mut PassSetupContext);

    /// Create pipelines and layouts that do not depend on the frame
    fn prepare(&mut self, _backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        Ok(())
    }

    /// Whether the pass runs for this frame
    fn is_enabled(&self, _frame: &FrameData) -> bool {
        true
    }

    /// Whether the executor polls for GPU errors once this pass is recorded
    fn checks_gpu_errors(&self) -> bool {
        false
    }

    /// Execute phase - record commands
    fn execute(&mut self, ctx: &mut PassExecuteContext) -> RenderResult<()>;

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Metadata about a pass in the graph
#[derive(Debug)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub inputs: Vec<ResourceAccess>,
    pub outputs: Vec<ResourceAccess>,
}

impl PassNode {
    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.inputs.iter().any(|a| a.resource == resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.outputs.iter().any(|a| a.resource == resource)
    }
}
