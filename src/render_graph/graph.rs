//! Render graph definition and compilation

use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Errors raised while compiling or executing a graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Pass dependencies form a cycle through '{0}'")]
    Cycle(String),
    #[error("Pass '{pass}' both reads and writes '{resource}'")]
    ReadWriteAlias { pass: String, resource: String },
    #[error("Resource '{0}' has no bound texture view")]
    UnboundResource(String),
}

/// The main render graph structure
pub struct RenderGraph {
    passes: Vec<Box<dyn RenderPass>>,
    pass_nodes: Vec<PassNode>,
    resources: Vec<VirtualResource>,
    next_pass_id: u32,
    next_resource_id: u32,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_nodes: Vec::new(),
            resources: Vec::new(),
            next_pass_id: 0,
            next_resource_id: 0,
        }
    }

    /// Register a named texture slot
    pub fn register_resource(&mut self, name: &str) -> ResourceId {
        if let Some(existing) = self.resource(name) {
            return existing;
        }
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.push(VirtualResource {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Get resource by name
    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn resource_name(&self, id: ResourceId) -> &str {
        self.resources
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.name.as_str())
            .unwrap_or("unknown")
    }

    /// Add a render pass to the graph
    pub fn add_pass<P: RenderPass + 'static>(&mut self, pass: P) -> PassId {
        let id = PassId(self.next_pass_id);
        self.next_pass_id += 1;

        let name = pass.name().to_string();
        let mut boxed_pass = Box::new(pass);

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        {
            let mut ctx = PassSetupContext {
                resources: &self.resources,
                inputs: &mut inputs,
                outputs: &mut outputs,
            };
            boxed_pass.setup(&mut ctx);
        }

        self.passes.push(boxed_pass);
        self.pass_nodes.push(PassNode {
            id,
            name,
            inputs,
            outputs,
        });

        id
    }

    /// Validate the graph and order its passes.
    ///
    /// A pass runs after every pass that writes a resource it reads. Passes
    /// writing the same resource keep their insertion order. Ties are broken
    /// by insertion order, so compilation is deterministic.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        for node in &self.pass_nodes {
            if let Some(access) = node
                .inputs
                .iter()
                .find(|input| node.writes_resource(input.resource))
            {
                return Err(GraphError::ReadWriteAlias {
                    pass: node.name.clone(),
                    resource: self.resource_name(access.resource).to_string(),
                });
            }
        }

        let count = self.pass_nodes.len();
        let mut dependencies: Vec<HashSet<usize>> = vec![HashSet::new(); count];

        for (reader_index, reader) in self.pass_nodes.iter().enumerate() {
            for (writer_index, writer) in self.pass_nodes.iter().enumerate() {
                if reader_index == writer_index {
                    continue;
                }

                let read_after_write = reader
                    .inputs
                    .iter()
                    .any(|input| writer.writes_resource(input.resource));
                let ordered_write = writer_index < reader_index
                    && reader
                        .outputs
                        .iter()
                        .any(|output| writer.writes_resource(output.resource));

                if read_after_write || ordered_write {
                    dependencies[reader_index].insert(writer_index);
                }
            }
        }

        // Kahn's algorithm, always taking the earliest inserted ready pass
        let mut in_degree: Vec<usize> = dependencies.iter().map(HashSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(count);

        while let Some(index) = ready.pop_first() {
            sorted.push(self.pass_nodes[index].id);

            for (dependent, deps) in dependencies.iter().enumerate() {
                if deps.contains(&index) {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if sorted.len() != count {
            let stuck = (0..count)
                .find(|&i| in_degree[i] > 0)
                .map(|i| self.pass_nodes[i].name.clone())
                .unwrap_or_default();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(CompiledGraph { pass_order: sorted })
    }

    /// Get pass nodes (metadata)
    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.pass_nodes
    }

    /// Get all resources
    pub fn resources(&self) -> &[VirtualResource] {
        &self.resources
    }

    fn index_of(&self, id: PassId) -> Option<usize> {
        self.pass_nodes.iter().position(|n| n.id == id)
    }

    /// Get pass by ID
    pub fn get_pass(&self, id: PassId) -> Option<&dyn RenderPass> {
        let index = self.index_of(id)?;
        Some(self.passes[index].as_ref())
    }

    pub fn get_pass_mut(&mut self, id: PassId) -> Option<&mut (dyn RenderPass + 'static)> {
        let index = self.index_of(id)?;
        Some(self.passes[index].as_mut())
    }

    /// Get pass node by ID
    pub fn get_pass_node(&self, id: PassId) -> Option<&PassNode> {
        self.pass_nodes.iter().find(|n| n.id == id)
    }

    /// Find the first pass of a concrete type
    pub fn find_pass_mut<P: RenderPass + 'static>(&mut self) -> Option<&mut P> {
        self.passes
            .iter_mut()
            .find_map(|pass| pass.as_any_mut().downcast_mut::<P>())
    }

    pub(crate) fn passes_mut(&mut self) -> &mut [Box<dyn RenderPass>] {
        &mut self.passes
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled render graph with its execution order
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
}

impl CompiledGraph {
    /// Pass names in execution order
    pub fn pass_names<'g>(&self, graph: &'g RenderGraph) -> Vec<&'g str> {
        self.pass_order
            .iter()
            .filter_map(|&id| graph.get_pass_node(id))
            .map(|node| node.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestPass {
        name: &'static str,
        reads: Vec<ResourceId>,
        writes: Vec<ResourceId>,
    }

    impl RenderPass for TestPass {
        fn name(&self) -> &str {
            self.name
        }

        fn setup(&mut self, ctx: &mut PassSetupContext) {
            for &r in &self.reads {
                ctx.read(r);
            }
            for &w in &self.writes {
                ctx.write(w, ResourceUsage::RenderTarget);
            }
        }

        fn execute(&mut self, _ctx: &mut PassExecuteContext) -> crate::error::RenderResult<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn pass(name: &'static str, reads: &[ResourceId], writes: &[ResourceId]) -> TestPass {
        TestPass {
            name,
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        }
    }

    #[test]
    fn test_readers_run_after_writers() {
        let mut graph = RenderGraph::new();
        let gbuffer = graph.register_resource("gbuffer");
        let lit = graph.register_resource("lit");
        let output = graph.register_resource("output");

        // Inserted out of order on purpose
        graph.add_pass(pass("present", &[lit], &[output]));
        graph.add_pass(pass("lighting", &[gbuffer], &[lit]));
        graph.add_pass(pass("geometry", &[], &[gbuffer]));

        let compiled = graph.compile().unwrap();
        assert_eq!(
            compiled.pass_names(&graph),
            vec!["geometry", "lighting", "present"]
        );
    }

    #[test]
    fn test_independent_passes_keep_insertion_order() {
        let mut graph = RenderGraph::new();
        let a = graph.register_resource("a");
        let b = graph.register_resource("b");
        graph.add_pass(pass("first", &[], &[a]));
        graph.add_pass(pass("second", &[], &[b]));

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_names(&graph), vec!["first", "second"]);
    }

    #[test]
    fn test_read_write_alias_is_rejected() {
        let mut graph = RenderGraph::new();
        let lit = graph.register_resource("lit");
        graph.add_pass(pass("feedback", &[lit], &[lit]));

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::ReadWriteAlias {
                pass: "feedback".into(),
                resource: "lit".into(),
            }
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = RenderGraph::new();
        let a = graph.register_resource("a");
        let b = graph.register_resource("b");
        graph.add_pass(pass("ping", &[b], &[a]));
        graph.add_pass(pass("pong", &[a], &[b]));

        assert!(matches!(graph.compile(), Err(GraphError::Cycle(_))));
    }
}
