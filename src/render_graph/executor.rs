//! Render graph executor

use crate::backend::traits::*;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::frame::FrameData;
use crate::pipeline::targets::FrameTargets;
use crate::render_graph::graph::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::HashMap;

/// Runs a compiled graph against the views bound for one sub-pass
pub struct RenderGraphExecutor {
    views: HashMap<ResourceId, TextureViewHandle>,
}

impl RenderGraphExecutor {
    pub fn new() -> Self {
        Self {
            views: HashMap::new(),
        }
    }

    /// Bind a texture view to a graph resource for the next execution
    pub fn bind_view(&mut self, resource: ResourceId, view: TextureViewHandle) {
        self.views.insert(resource, view);
    }

    pub fn clear_bindings(&mut self) {
        self.views.clear();
    }

    /// Let every pass create its frame-independent pipelines
    pub fn prepare(
        &self,
        graph: &mut RenderGraph,
        backend: &mut dyn GraphicsBackend,
    ) -> RenderResult<()> {
        for pass in graph.passes_mut() {
            pass.prepare(backend)?;
        }
        Ok(())
    }

    /// Execute the graph in compiled order
    pub fn execute(
        &self,
        graph: &mut RenderGraph,
        compiled: &CompiledGraph,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameData,
        targets: &FrameTargets,
    ) -> RenderResult<()> {
        if let Some(unbound) = graph
            .resources()
            .iter()
            .find(|r| !self.views.contains_key(&r.id))
        {
            return Err(GraphError::UnboundResource(unbound.name.clone()).into());
        }

        for &pass_id in &compiled.pass_order {
            let Some(pass) = graph.get_pass_mut(pass_id) else {
                continue;
            };
            if !pass.is_enabled(frame) {
                log::trace!("Skipping disabled pass '{}'", pass.name());
                continue;
            }

            {
                let mut ctx = PassExecuteContext {
                    backend: &mut *backend,
                    frame,
                    targets,
                    views: &self.views,
                };
                pass.execute(&mut ctx)?;
            }

            if pass.checks_gpu_errors() {
                backend.check_errors().map_err(|source| RenderError::Gpu {
                    pass: pass.name().to_string(),
                    source,
                })?;
            }
        }

        Ok(())
    }
}

impl Default for RenderGraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}
