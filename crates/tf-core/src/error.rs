//! Unified error type for the thumbforge pipeline.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in thumbforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "join", "object").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The blob store rejected a read or write.
    #[error("Storage error [{container}/{object}]: {message}")]
    Storage {
        /// Container the operation targeted.
        container: String,
        /// Object name inside the container (may be empty for container ops).
        object: String,
        /// Human-readable error description.
        message: String,
    },

    /// A channel could not be opened, read, or committed.
    #[error("Channel error [{channel}]: {message}")]
    Channel {
        /// Channel name.
        channel: String,
        /// Human-readable error description.
        message: String,
    },

    /// An event could not be published to a channel.
    #[error("Publish error [{channel}]: {message}")]
    Publish {
        /// Channel name.
        channel: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool (ffmpeg) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Outbound mail delivery failed.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// A message payload could not be encoded or decoded.
    #[error("Serialization error: {source}")]
    Serialization {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Storage { .. } => 500,
            Error::Channel { .. } => 503,
            Error::Publish { .. } => 503,
            Error::Tool { .. } => 502,
            Error::Delivery(_) => 502,
            Error::Serialization { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::Storage { .. } => "storage_error",
            Error::Channel { .. } => "channel_error",
            Error::Publish { .. } => "publish_error",
            Error::Tool { .. } => "tool_error",
            Error::Delivery(_) => "delivery_error",
            Error::Serialization { .. } => "serialization_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether retrying the same operation can never succeed.
    ///
    /// Consumers use this to skip the retry budget for malformed messages.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::Serialization { .. } | Error::Validation(_))
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Storage`].
    pub fn storage(
        container: impl Into<String>,
        object: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Error::Storage {
            container: container.into(),
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Channel`].
    pub fn channel(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Channel {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Publish`].
    pub fn publish(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Publish {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
