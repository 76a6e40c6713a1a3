//! Error types shared by the writer, its collaborators and the
//! configuration helpers.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by an [`crate::client::IngestClient`].
#[derive(Error, Debug)]
pub enum IngestError {
    /// The request never produced a response (connection refused, timeout, ...).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// Cluster health did not reach the requested state in time.
    #[error("cluster unhealthy: {0}")]
    Unhealthy(String),
}

impl IngestError {
    pub fn transport(message: impl Into<String>) -> Self {
        IngestError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        IngestError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Why a bulk request did not deliver every record.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("bulk request rejected: {0}")]
    Rejected(#[from] IngestError),

    #[error("{failed} of {total} bulk items failed: {first_reason}")]
    ItemsFailed {
        failed: usize,
        total: usize,
        first_reason: String,
    },
}

/// Failure while ensuring the index template exists.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to check template {name}: {source}")]
    Check {
        name: String,
        #[source]
        source: IngestError,
    },

    #[error("failed to create template {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: IngestError,
    },

    #[error("invalid template document: {0}")]
    InvalidDocument(String),
}

/// One attempt of the readiness check.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("health check failed: {0}")]
    Health(#[from] IngestError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Outcome of a connection check that did not reach readiness.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("endpoint not ready after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: CheckError },

    #[error("connection check cancelled")]
    Cancelled,
}

/// Errors returned when constructing a [`crate::writer::BulkWriter`].
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("bulk writer must be created inside a tokio runtime")]
    NoRuntime,

    #[error("invalid configuration: {0}")]
    Config(String),
}
