use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{EngineBootstrap, ExecutionEngine, StdoutHook};
use crate::error::EngineError;

pub const DEFAULT_PYTHON: &str = "python3";

/// Probes a local Python interpreter and hands out a `PythonEngine` for it.
#[derive(Debug, Clone)]
pub struct PythonBootstrap {
    interpreter: PathBuf,
}

impl PythonBootstrap {
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for PythonBootstrap {
    fn default() -> Self {
        Self::new(DEFAULT_PYTHON)
    }
}

#[async_trait]
impl EngineBootstrap for PythonBootstrap {
    async fn initialize(&self) -> Result<Arc<dyn ExecutionEngine>, EngineError> {
        let output = Command::new(&self.interpreter)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| {
                EngineError::Bootstrap(format!("{}: {err}", self.interpreter.display()))
            })?;

        if !output.status.success() {
            return Err(EngineError::Bootstrap(format!(
                "{} --version exited with {}",
                self.interpreter.display(),
                output.status
            )));
        }

        // Older interpreters print the version on stderr.
        let version = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).trim().to_string()
        } else {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        };
        tracing::info!(interpreter = %self.interpreter.display(), %version, "python interpreter found");

        Ok(Arc::new(PythonEngine::new(&self.interpreter)))
    }
}

/// Runs each submission in a fresh interpreter process.
///
/// The interpreter starts in isolated mode (`-I`: no user site-packages, no
/// `PYTHON*` environment variables) with unbuffered output, reads the program
/// from stdin, and is killed if the run future is dropped. This isolates runs
/// from each other; it is not a security boundary.
pub struct PythonEngine {
    interpreter: PathBuf,
    stdout: Mutex<Option<StdoutHook>>,
}

impl PythonEngine {
    #[must_use]
    pub fn new(interpreter: &Path) -> Self {
        Self {
            interpreter: interpreter.to_path_buf(),
            stdout: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ExecutionEngine for PythonEngine {
    fn set_stdout(&self, hook: Option<StdoutHook>) {
        *self.stdout.lock().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    async fn run(&self, source: &str) -> Result<(), EngineError> {
        let hook = self
            .stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut child = Command::new(&self.interpreter)
            .args(["-I", "-u", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(mut stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(EngineError::Runtime("interpreter pipes unavailable".into()));
        };

        let feed = async move {
            stdin.write_all(source.as_bytes()).await?;
            stdin.shutdown().await
        };
        let pump = async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(hook) = &hook {
                    hook(&line);
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let drain = async move {
            let mut text = String::new();
            stderr.read_to_string(&mut text).await?;
            Ok::<_, std::io::Error>(text)
        };

        let (fed, pumped, errors) = tokio::join!(feed, pump, drain);
        let status = child.wait().await?;

        // A program that exits early closes stdin; the exit status is what matters.
        if let Err(err) = fed {
            tracing::debug!(error = %err, "interpreter closed stdin before reading all source");
        }
        pumped?;
        let errors = errors?;

        if status.success() {
            return Ok(());
        }

        let message = errors.trim();
        if message.is_empty() {
            Err(EngineError::Runtime(format!("interpreter exited with {status}")))
        } else {
            Err(EngineError::Runtime(message.to_string()))
        }
    }
}
