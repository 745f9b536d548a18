use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{EngineBootstrap, ExecutionEngine, StdoutHook};
use crate::error::EngineError;

/// What a scripted run prints and whether it raises afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub stdout: Vec<String>,
    pub error: Option<String>,
}

impl Script {
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn printing<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stdout: lines.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    #[must_use]
    pub fn raising(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

type Behavior = dyn Fn(&str) -> Script + Send + Sync;

/// In-process engine driven by a closure over the submitted source.
///
/// Intended for tests and prototyping; nothing is actually interpreted.
pub struct ScriptedEngine {
    behavior: Box<Behavior>,
    stdout: Mutex<Option<StdoutHook>>,
    runs: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedEngine {
    #[must_use]
    pub fn new(behavior: impl Fn(&str) -> Script + Send + Sync + 'static) -> Self {
        Self {
            behavior: Box::new(behavior),
            stdout: Mutex::new(None),
            runs: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Hold every run until the gate is notified once per run.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of runs started so far.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_stdout_hook(&self) -> bool {
        self.stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    fn set_stdout(&self, hook: Option<StdoutHook>) {
        *self.stdout.lock().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    async fn run(&self, source: &str) -> Result<(), EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let script = (self.behavior)(source);
        let hook = self
            .stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            for line in &script.stdout {
                hook(line);
            }
        }

        match script.error {
            Some(message) => Err(EngineError::Runtime(message)),
            None => Ok(()),
        }
    }
}

/// Bootstrap that hands out a prepared `ScriptedEngine` or fails on purpose.
pub struct ScriptedBootstrap {
    engine: Option<Arc<ScriptedEngine>>,
    failure: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedBootstrap {
    #[must_use]
    pub fn new(engine: Arc<ScriptedEngine>) -> Self {
        Self {
            engine: Some(engine),
            failure: String::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            engine: None,
            failure: message.into(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before resolving, to keep initialization in flight.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `initialize` was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineBootstrap for ScriptedBootstrap {
    async fn initialize(&self) -> Result<Arc<dyn ExecutionEngine>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.engine {
            Some(engine) => {
                let engine: Arc<dyn ExecutionEngine> = engine.clone();
                Ok(engine)
            }
            None => Err(EngineError::Bootstrap(self.failure.clone())),
        }
    }
}
