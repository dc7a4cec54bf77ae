//! Errors raised by the span report exporter.
use std::path::PathBuf;
use std::sync::PoisonError;

use opentelemetry_sdk::error::OTelSdkError;
use thiserror::Error;

/// A specialized `Result` type for span report operations.
pub type ReportResult<T> = Result<T, SpanReportError>;

/// Errors returned by the rotation scheduler, the report sinks and the exporter.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SpanReportError {
    /// The report sink could not be opened or written to.
    #[error("failed to write span report to {path:?}: {source}")]
    Sink {
        /// Location of the sink that failed.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The exporter or its scheduler has already been shut down.
    #[error("span report exporter is already shut down")]
    AlreadyShutdown,

    /// A rotation was requested but did not complete.
    #[error("rotation failed")]
    RotationFailed,

    /// Any other failure, such as a poisoned lock or a dead scheduler thread.
    #[error("{0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for SpanReportError {
    fn from(err: PoisonError<T>) -> Self {
        SpanReportError::InternalFailure(format!("mutex poisoned: {}", err))
    }
}

impl From<SpanReportError> for OTelSdkError {
    fn from(err: SpanReportError) -> Self {
        match err {
            SpanReportError::AlreadyShutdown => OTelSdkError::AlreadyShutdown,
            other => OTelSdkError::InternalFailure(other.to_string()),
        }
    }
}
