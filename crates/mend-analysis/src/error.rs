//! Error types for impact analysis

/// Failures reported by a [`ReferenceIndex`](crate::ReferenceIndex)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    /// Backing service is not running or not reachable
    #[error("reference index unavailable: {0}")]
    Unavailable(String),

    /// The query itself failed
    #[error("reference query failed: {0}")]
    Query(String),

    /// The index does not know the requested file
    #[error("file not indexed: {0}")]
    NotIndexed(String),
}
