use thiserror::Error;

/// Error taxonomy for Mofka operations.
///
/// Every variant corresponds to one of the error kinds a producer or
/// consumer future can resolve with. Producer-path failures resolve
/// the offending push's future; server-side failures during
/// `receiveBatch` roll back the log reservation before returning one
/// of these; consumer-side failures resolve only the affected event's
/// future unless the kind is `Transport`, which tears down the whole
/// partition subscription.
#[derive(Debug, Error, Clone)]
pub enum MofkaError {
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("unknown partition: {0}")]
    UnknownPartition(String),

    #[error("failed to load plugin library: {0}")]
    PluginLoadFailed(String),

    #[error("unknown policy plugin: {0}")]
    UnknownPlugin(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation on a destroyed partition or detached consumer")]
    Closed,

    #[error("back-pressure: max in-flight batches exceeded")]
    BackPressure,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("user callback failed: {0}")]
    PluginUserError(String),
}

impl From<serde_json::Error> for MofkaError {
    fn from(err: serde_json::Error) -> Self {
        MofkaError::InvalidMetadata(err.to_string())
    }
}

/// Result type alias for Mofka operations.
pub type Result<T> = std::result::Result<T, MofkaError>;
