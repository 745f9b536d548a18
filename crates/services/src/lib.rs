#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod engine;
pub mod error;
pub mod sessions;

pub use assess_core::Clock;

pub use app_services::AppServices;
pub use config::AssessmentConfig;
pub use engine::{
    EngineBootstrap, EngineHost, EngineState, ExecutionEngine, PythonBootstrap, ScriptedBootstrap,
    ScriptedEngine,
};
pub use error::{AppServicesError, EngineError, SessionError};
pub use sessions::{
    AssessmentSession, Countdown, RunId, RunIgnored, RunOutcome, RunReport, SessionSnapshot,
    Walkthrough,
};
