//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::model::ScenarioId;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors raised by an execution engine or its bootstrap.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("engine failed to initialize: {0}")]
    Bootstrap(String),
    #[error("engine error: {0}")]
    Runtime(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("unknown scenario: {0}")]
    UnknownScenario(ScenarioId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
