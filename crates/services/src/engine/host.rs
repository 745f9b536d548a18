use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, OnceCell, watch};

use super::{EngineBootstrap, ExecutionEngine};

/// Lifecycle of the process-wide engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Failed => "failed",
        };
        f.write_str(label)
    }
}

type Bootstrapped = Result<Arc<dyn ExecutionEngine>, String>;

/// Owns the single engine instance shared by every session.
///
/// Bootstrap runs at most once per host: concurrent callers of
/// [`EngineHost::ensure_ready`] await the same in-flight initialization, and a
/// failure is final. The only way to retry is to build a new host, which in
/// practice means restarting the process.
pub struct EngineHost {
    bootstrap: Arc<dyn EngineBootstrap>,
    engine: OnceCell<Bootstrapped>,
    state: watch::Sender<EngineState>,
    run_slot: Mutex<()>,
}

/// Exclusive use of the ready engine for one run.
pub struct EngineLease<'a> {
    engine: Arc<dyn ExecutionEngine>,
    _slot: MutexGuard<'a, ()>,
}

impl Deref for EngineLease<'_> {
    type Target = dyn ExecutionEngine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl EngineHost {
    #[must_use]
    pub fn new(bootstrap: Arc<dyn EngineBootstrap>) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self {
            bootstrap,
            engine: OnceCell::new(),
            state,
            run_slot: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn shared(bootstrap: Arc<dyn EngineBootstrap>) -> Arc<Self> {
        Arc::new(Self::new(bootstrap))
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. to enable a run control once ready.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Bootstrap the engine if nobody has yet, then report the settled state.
    pub async fn ensure_ready(&self) -> EngineState {
        self.engine
            .get_or_init(|| async {
                self.state.send_replace(EngineState::Loading);
                tracing::info!("bootstrapping execution engine");
                match self.bootstrap.initialize().await {
                    Ok(engine) => {
                        self.state.send_replace(EngineState::Ready);
                        tracing::info!("execution engine ready");
                        Ok(engine)
                    }
                    Err(err) => {
                        self.state.send_replace(EngineState::Failed);
                        tracing::error!(error = %err, "execution engine failed to initialize");
                        Err(err.to_string())
                    }
                }
            })
            .await;
        self.state()
    }

    /// The engine, once bootstrap has succeeded.
    #[must_use]
    pub fn engine(&self) -> Option<Arc<dyn ExecutionEngine>> {
        match self.engine.get() {
            Some(Ok(engine)) => Some(Arc::clone(engine)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.engine.get(), Some(Ok(_)))
    }

    /// Bootstrap failure text, if bootstrap failed.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match self.engine.get() {
            Some(Err(message)) => Some(message.as_str()),
            _ => None,
        }
    }

    /// Wait for exclusive use of the engine. Returns `None` unless ready.
    ///
    /// Runs from different sessions are serialized here so two runs never
    /// share the engine's output hook.
    pub async fn lease(&self) -> Option<EngineLease<'_>> {
        let engine = self.engine()?;
        let slot = self.run_slot.lock().await;
        Some(EngineLease {
            engine,
            _slot: slot,
        })
    }
}

impl fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHost")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Script, ScriptedBootstrap, ScriptedEngine};
    use std::time::Duration;

    fn ready_bootstrap() -> Arc<ScriptedBootstrap> {
        let engine = Arc::new(ScriptedEngine::new(|_| Script::silent()));
        Arc::new(ScriptedBootstrap::new(engine).with_delay(Duration::from_millis(20)))
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let host = EngineHost::new(ready_bootstrap());
        assert_eq!(host.state(), EngineState::Uninitialized);
        assert!(host.engine().is_none());
        assert!(host.lease().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_bootstrap_runs_once() {
        let bootstrap = ready_bootstrap();
        let host = EngineHost::shared(bootstrap.clone());

        let (a, b) = tokio::join!(host.ensure_ready(), host.ensure_ready());
        assert_eq!(a, EngineState::Ready);
        assert_eq!(b, EngineState::Ready);
        assert_eq!(bootstrap.calls(), 1);

        assert_eq!(host.ensure_ready().await, EngineState::Ready);
        assert_eq!(bootstrap.calls(), 1);
        assert!(host.is_ready());
    }

    #[tokio::test]
    async fn failure_is_final_and_shared() {
        let bootstrap = Arc::new(ScriptedBootstrap::failing("network unreachable"));
        let host = EngineHost::shared(bootstrap.clone());

        let (a, b) = tokio::join!(host.ensure_ready(), host.ensure_ready());
        assert_eq!(a, EngineState::Failed);
        assert_eq!(b, EngineState::Failed);

        assert_eq!(host.ensure_ready().await, EngineState::Failed);
        assert_eq!(bootstrap.calls(), 1);
        assert!(host.engine().is_none());
        assert!(host.failure().unwrap().contains("network unreachable"));
    }

    #[tokio::test]
    async fn subscribers_see_loading_then_ready() {
        let host = EngineHost::shared(ready_bootstrap());
        let mut rx = host.subscribe();

        let waiter = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.ensure_ready().await })
        };

        rx.wait_for(|state| *state == EngineState::Loading)
            .await
            .unwrap();
        rx.wait_for(|state| *state == EngineState::Ready)
            .await
            .unwrap();
        assert_eq!(waiter.await.unwrap(), EngineState::Ready);
    }

    #[tokio::test]
    async fn lease_is_exclusive() {
        let host = EngineHost::shared(ready_bootstrap());
        host.ensure_ready().await;

        let first = host.lease().await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(20), host.lease()).await;
        assert!(second.is_err());

        drop(first);
        assert!(host.lease().await.is_some());
    }
}
