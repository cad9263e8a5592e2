//! Top-level render errors and the recoverable/fatal split

use crate::backend::BackendError;
use crate::render_graph::GraphError;
use crate::resources::mesh::MeshError;
use crate::resources::texture::TextureError;
use crate::subdivision::TopologyError;
use thiserror::Error;

/// Errors surfaced by the renderer and the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("scene must have at least one light")]
    NoLights,
    #[error("too many lights: {count} exceeds the maximum of {max}")]
    TooManyLights { count: usize, max: usize },
    #[error("Invalid mesh topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("Invalid mesh: {0}")]
    Mesh(#[from] MeshError),
    #[error("Material '{material}' needs vertex attribute '{attribute}' that mesh '{mesh}' lacks")]
    MissingVertexAttribute {
        material: String,
        mesh: String,
        attribute: String,
    },
    #[error("G-buffer preview index {index} is out of range (0..{count})")]
    InvalidPreviewIndex { index: usize, count: usize },
    #[error("Failed to load texture: {0}")]
    Texture(#[from] TextureError),
    #[error("Unknown {kind} id {id}")]
    UnknownAsset { kind: &'static str, id: usize },
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("GPU error after {pass}: {source}")]
    Gpu {
        pass: String,
        source: BackendError,
    },
    #[error("Render graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    /// Whether the frame can simply be skipped and rendering continued.
    ///
    /// Initialization, shader compilation, allocation, GPU state, graph and
    /// attachment errors are fatal; everything caused by scene content or a
    /// transient surface state is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RenderError::NoLights
            | RenderError::TooManyLights { .. }
            | RenderError::Topology(_)
            | RenderError::Mesh(_)
            | RenderError::MissingVertexAttribute { .. }
            | RenderError::InvalidPreviewIndex { .. }
            | RenderError::Texture(_)
            | RenderError::UnknownAsset { .. } => true,
            RenderError::Backend(err) => matches!(
                err,
                BackendError::SurfaceLost | BackendError::SurfaceOutdated
            ),
            RenderError::Gpu { .. }
            | RenderError::Graph(_)
            | RenderError::Config(_)
            | RenderError::InvalidAttachment(_) => false,
        }
    }
}

/// Outcome of one `Engine::render` call
#[derive(Debug, Clone, PartialEq)]
pub enum FrameStatus {
    Presented,
    /// The frame was dropped because of a recoverable error
    Skipped(RenderError),
}

impl FrameStatus {
    pub fn is_presented(&self) -> bool {
        matches!(self, FrameStatus::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_errors_are_recoverable() {
        assert!(RenderError::NoLights.is_recoverable());
        assert!(RenderError::TooManyLights { count: 20, max: 16 }.is_recoverable());
    }

    #[test]
    fn test_surface_loss_is_recoverable_but_shader_failure_is_not() {
        assert!(RenderError::Backend(BackendError::SurfaceLost).is_recoverable());
        assert!(RenderError::Backend(BackendError::SurfaceOutdated).is_recoverable());
        assert!(
            !RenderError::Backend(BackendError::ShaderCreationFailed("lighting".into()))
                .is_recoverable()
        );
        assert!(!RenderError::Gpu {
            pass: "Geometry".into(),
            source: BackendError::Validation("bad bind".into()),
        }
        .is_recoverable());
    }

    #[test]
    fn test_too_many_lights_names_both_counts() {
        let message = RenderError::TooManyLights { count: 20, max: 8 }.to_string();
        assert!(message.contains("20"));
        assert!(message.contains('8'));
    }
}
