//! Error types for the reachtree index.

use crate::store::NodeId;
use reachtree_types::ObjectId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Boxed failure raised by a store or pattern-matching collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown configuration key: {0}")]
    UnknownConfigKey(String),

    #[error("unknown split mode: {0}")]
    UnknownSplitMode(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("object {0} is already indexed")]
    DuplicateObject(ObjectId),

    #[error("object {0} is not indexed")]
    ObjectNotFound(ObjectId),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("no candidate subtree below node {0}")]
    NoCandidateSubtree(NodeId),

    #[error("node {0} does not exist in the store")]
    MissingNode(NodeId),

    #[error("node {0} has no envelope")]
    MissingEnvelope(NodeId),

    #[error("node {node} is not a {expected} node")]
    UnexpectedNodeKind { node: NodeId, expected: &'static str },

    #[error("height mismatch: expected {expected}, found {found}")]
    HeightMismatch { expected: usize, found: usize },

    #[error("split of node {0} found no assignable entry")]
    SplitFailed(NodeId),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("index is poisoned by an earlier structural failure")]
    Poisoned,

    #[error("store failure: {0}")]
    Store(#[source] BoxError),

    #[error("pattern engine failure: {0}")]
    Engine(#[source] BoxError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// True for errors that indicate a broken tree invariant. A mutation that
    /// fails this way leaves the index poisoned.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            IndexError::NoCandidateSubtree(_)
                | IndexError::MissingNode(_)
                | IndexError::MissingEnvelope(_)
                | IndexError::UnexpectedNodeKind { .. }
                | IndexError::HeightMismatch { .. }
                | IndexError::SplitFailed(_)
                | IndexError::InvariantViolation(_)
                | IndexError::Store(_)
        )
    }

    /// Wrap a failure raised by a custom [`TreeStore`](crate::store::TreeStore).
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        IndexError::Store(Box::new(err))
    }

    /// Wrap a failure raised by a [`PatternMatcher`](crate::query::PatternMatcher).
    pub fn engine<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        IndexError::Engine(Box::new(err))
    }
}
