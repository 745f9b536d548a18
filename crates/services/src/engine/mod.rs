//! Boundary to the sandboxed interpreter.
//!
//! The engine is opaque: it executes source text, streams what the program
//! writes to standard output through a hook, and reports execution errors.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;

mod capture;
mod host;
mod python;
mod scripted;

pub use capture::OutputCapture;
pub use host::{EngineHost, EngineLease, EngineState};
pub use python::{DEFAULT_PYTHON, PythonBootstrap, PythonEngine};
pub use scripted::{Script, ScriptedBootstrap, ScriptedEngine};

/// Receives one line of standard output, without its trailing newline.
pub type StdoutHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A ready interpreter instance.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Install or remove the standard output hook used by subsequent runs.
    fn set_stdout(&self, hook: Option<StdoutHook>);

    /// Execute `source` to completion.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Runtime` if the program raised, or other variants
    /// if the engine itself failed.
    async fn run(&self, source: &str) -> Result<(), EngineError>;
}

/// One-shot, potentially expensive engine construction.
#[async_trait]
pub trait EngineBootstrap: Send + Sync {
    /// # Errors
    ///
    /// Returns `EngineError::Bootstrap` if the engine cannot be brought up.
    async fn initialize(&self) -> Result<Arc<dyn ExecutionEngine>, EngineError>;
}
