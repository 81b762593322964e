#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress_service;
pub mod reconcile;
pub mod remote;

pub use vocab_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, RemoteError};
pub use progress_service::{FlushReport, LoadReport, LoadSource, ProgressService};
pub use remote::{
    CredentialProvider, HttpProgressRemote, ProgressRemote, RemoteConfig, RemoteRecord,
    RemoteSummary, StaticCredentials,
};
