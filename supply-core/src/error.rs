//! Error types for declaration and assembly.
//!
//! Declaration-time errors (naming, cycles, misplaced mocks) are returned
//! synchronously from the declaring call. Assembly-time errors are cached
//! inside the failing supply and handed back, unchanged, every time that
//! supply is read.

use std::error::Error as StdError;
use std::sync::Arc;

use crate::graph::NodeName;

/// Boxed error returned by user construction functions.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced by the registry, the team builder and the assembly engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SupplyError {
    #[error("node `{0}` is already declared in this registry")]
    DuplicateName(NodeName),

    #[error("`{0}` is not a valid node name")]
    InvalidName(String),

    #[error("circular dependency on `{node}`: {}", render_path(.path))]
    CircularDependency { node: NodeName, path: Vec<NodeName> },

    #[error("mock of `{mock}` cannot be a direct dependency of `{dependent}`; introduce it with hire")]
    MockAsDependency { mock: NodeName, dependent: NodeName },

    #[error("missing dependency: `{0}` has no value")]
    MissingDependency(NodeName),

    #[error("construction of `{node}` failed: {source}")]
    Construction {
        node: NodeName,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    #[error("value of `{node}` is not a `{expected}`")]
    TypeMismatch {
        node: NodeName,
        expected: &'static str,
    },
}

impl SupplyError {
    /// Wrap an error raised by a node's own logic.
    ///
    /// Engine errors surfacing from a dependency read are passed through
    /// untouched so the caller sees the original failure.
    pub(crate) fn construction(node: &NodeName, err: BoxError) -> Self {
        match err.downcast::<SupplyError>() {
            Ok(inner) => *inner,
            Err(other) => SupplyError::Construction {
                node: node.clone(),
                source: Arc::from(other),
            },
        }
    }

    /// Name of the node the error is about.
    pub fn node(&self) -> Option<&str> {
        match self {
            SupplyError::DuplicateName(name) | SupplyError::MissingDependency(name) => {
                Some(name.as_str())
            }
            SupplyError::InvalidName(_) => None,
            SupplyError::CircularDependency { node, .. }
            | SupplyError::Construction { node, .. }
            | SupplyError::TypeMismatch { node, .. } => Some(node.as_str()),
            SupplyError::MockAsDependency { mock, .. } => Some(mock.as_str()),
        }
    }

    /// The error raised by user code, if this is a construction failure.
    pub fn user_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            SupplyError::Construction { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

fn render_path(path: &[NodeName]) -> String {
    path.iter()
        .map(NodeName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SupplyError>;
