//! Shared error types for the services crate.

use reqwest::StatusCode;
use thiserror::Error;

use storage::sqlite::SqliteInitError;

/// Errors emitted by the remote progress client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("no credential available, progress stays local")]
    Unauthenticated,
    #[error("{message}")]
    Api { status: StatusCode, message: String },
    #[error("malformed progress response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
