//! Error types for the secindex core.

use crate::path::ContentPath;
use crate::tree::NodeId;

/// All errors that can occur while maintaining the shadow tree or reindexing.
#[derive(Debug, thiserror::Error)]
pub enum SecIndexError {
    /// Path argument is neither a segment sequence nor a `/`-delimited string.
    #[error("malformed path: {0}")]
    MalformedPath(String),

    /// No shadow node exists for the given path.
    #[error("no shadow node at {0}")]
    PathNotFound(ContentPath),

    /// A node handle that no longer refers to a live node.
    #[error("unknown shadow node {0}")]
    UnknownNode(NodeId),

    /// The root stands for no content and cannot be updated or removed.
    #[error("root node cannot be targeted by {0}")]
    RootImmutable(&'static str),

    /// A move whose destination is the source itself or lies inside it.
    #[error("cannot move {from} to {to}")]
    InvalidMove {
        /// Source path
        from: ContentPath,
        /// Destination path
        to: ContentPath,
    },

    /// The permission authority failed for a content node.
    #[error("permission fetch failed for {path}: {reason}")]
    PermissionFetch {
        /// Content node the fetch was for
        path: ContentPath,
        /// Rendered collaborator error
        reason: String,
    },

    /// The search index rejected an update.
    #[error("index update failed for {path}: {reason}")]
    IndexUpdate {
        /// Content node the update was for
        path: ContentPath,
        /// Rendered collaborator error
        reason: String,
    },

    /// The catalog could not be enumerated.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Key-value store failure or a poisoned tree lock.
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted tree could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SecIndexError>;
