use std::sync::Arc;

use assess_core::Catalog;
use assess_core::model::ScenarioId;
use storage::repository::Storage;
use storage::session_state::SessionStateRepository;

use crate::Clock;
use crate::config::AssessmentConfig;
use crate::engine::{EngineBootstrap, EngineHost};
use crate::error::{AppServicesError, SessionError};
use crate::sessions::AssessmentSession;

/// Assembles the catalog, persisted state and the shared engine, and opens
/// sessions against them.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<Catalog>,
    state_repo: SessionStateRepository,
    engine: Arc<EngineHost>,
    clock: Clock,
    config: AssessmentConfig,
}

impl AppServices {
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        storage: &Storage,
        bootstrap: Arc<dyn EngineBootstrap>,
        clock: Clock,
        config: AssessmentConfig,
    ) -> Self {
        let state_repo =
            SessionStateRepository::with_prefix(Arc::clone(&storage.state), config.key_prefix.clone());
        Self {
            catalog,
            state_repo,
            engine: EngineHost::shared(bootstrap),
            clock,
            config,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        catalog: Arc<Catalog>,
        bootstrap: Arc<dyn EngineBootstrap>,
        clock: Clock,
        config: AssessmentConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(catalog, &storage, bootstrap, clock, config))
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn engine(&self) -> Arc<EngineHost> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    /// Open a session on the given scenario, restoring persisted state.
    ///
    /// Engine bootstrap is not awaited here; call
    /// [`AssessmentSession::prepare_engine`] to bring it up.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownScenario` if the catalog has no such id.
    pub async fn open_session(&self, id: &ScenarioId) -> Result<AssessmentSession, SessionError> {
        let scenario = self
            .catalog
            .get(id)
            .ok_or_else(|| SessionError::UnknownScenario(id.clone()))?;
        Ok(AssessmentSession::open(
            scenario,
            self.state_repo.clone(),
            Arc::clone(&self.engine),
            self.clock,
            &self.config,
        )
        .await)
    }

    /// Forget the persisted code and timer of a scenario.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the entries cannot be deleted.
    pub async fn clear_session(&self, id: &ScenarioId) -> Result<(), SessionError> {
        self.state_repo.clear(id).await?;
        tracing::info!(scenario = %id, "cleared persisted session state");
        Ok(())
    }
}
