//! Persisted per-scenario session state.
//!
//! Two independent entries per scenario: the code buffer and the remaining
//! time (decimal text). Keys are derived from the scenario id only, never the
//! level, so moving between levels neither resets nor namespaces either value.

use std::sync::Arc;

use assess_core::model::ScenarioId;

use crate::repository::{KeyValueStore, StorageError};

pub const DEFAULT_KEY_PREFIX: &str = "codeevolve";

/// Key scheme plus typed access over a `KeyValueStore`.
#[derive(Clone)]
pub struct SessionStateRepository {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl SessionStateRepository {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_prefix(store, DEFAULT_KEY_PREFIX)
    }

    #[must_use]
    pub fn with_prefix(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn code_key(&self, scenario: &ScenarioId) -> String {
        format!("{}-{}-code", self.prefix, scenario)
    }

    #[must_use]
    pub fn timer_key(&self, scenario: &ScenarioId) -> String {
        format!("{}-{}-timer", self.prefix, scenario)
    }

    /// Load the saved code buffer, if any. An empty saved buffer counts as absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    pub async fn load_code(&self, scenario: &ScenarioId) -> Result<Option<String>, StorageError> {
        let saved = self.store.get(&self.code_key(scenario)).await?;
        Ok(saved.filter(|code| !code.is_empty()))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    pub async fn save_code(&self, scenario: &ScenarioId, code: &str) -> Result<(), StorageError> {
        self.store.put(&self.code_key(scenario), code).await
    }

    /// Load the remaining seconds. Values that are not a non-negative integer
    /// are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    pub async fn load_time_remaining(
        &self,
        scenario: &ScenarioId,
    ) -> Result<Option<u32>, StorageError> {
        let key = self.timer_key(scenario);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<u32>() {
            Ok(secs) => Ok(Some(secs)),
            Err(err) => {
                tracing::warn!(%key, value = %raw, error = %err, "ignoring unparseable timer value");
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    pub async fn save_time_remaining(
        &self,
        scenario: &ScenarioId,
        seconds: u32,
    ) -> Result<(), StorageError> {
        self.store
            .put(&self.timer_key(scenario), &seconds.to_string())
            .await
    }

    /// Remove both entries for a scenario so the next session starts fresh.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    pub async fn clear(&self, scenario: &ScenarioId) -> Result<(), StorageError> {
        self.store.delete(&self.code_key(scenario)).await?;
        self.store.delete(&self.timer_key(scenario)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;

    fn scenario(id: &str) -> ScenarioId {
        ScenarioId::new(id).unwrap()
    }

    #[test]
    fn keys_are_scoped_by_scenario() {
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        assert_eq!(repo.code_key(&scenario("banking")), "codeevolve-banking-code");
        assert_eq!(repo.timer_key(&scenario("banking")), "codeevolve-banking-timer");
    }

    #[tokio::test]
    async fn timer_is_stored_as_decimal_text() {
        let store = InMemoryStore::new();
        let repo = SessionStateRepository::new(Arc::new(store.clone()));
        let id = scenario("banking");

        repo.save_time_remaining(&id, 4199).await.unwrap();
        assert_eq!(
            store.get("codeevolve-banking-timer").await.unwrap().as_deref(),
            Some("4199")
        );
        assert_eq!(repo.load_time_remaining(&id).await.unwrap(), Some(4199));
    }

    #[tokio::test]
    async fn garbage_timer_is_absent() {
        let store = InMemoryStore::new();
        let repo = SessionStateRepository::new(Arc::new(store.clone()));
        store.put("codeevolve-banking-timer", "soon").await.unwrap();
        store.put("codeevolve-library-timer", "-5").await.unwrap();

        assert_eq!(repo.load_time_remaining(&scenario("banking")).await.unwrap(), None);
        assert_eq!(repo.load_time_remaining(&scenario("library")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn scenarios_do_not_share_state() {
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        let a = scenario("a");
        let b = scenario("b");

        repo.save_code(&a, "class A: pass").await.unwrap();
        repo.save_time_remaining(&a, 10).await.unwrap();

        assert_eq!(repo.load_code(&b).await.unwrap(), None);
        assert_eq!(repo.load_time_remaining(&b).await.unwrap(), None);
        assert_eq!(repo.load_code(&a).await.unwrap().as_deref(), Some("class A: pass"));
    }

    #[tokio::test]
    async fn clear_removes_both_entries() {
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        let id = scenario("banking");
        repo.save_code(&id, "x = 1").await.unwrap();
        repo.save_time_remaining(&id, 5).await.unwrap();

        repo.clear(&id).await.unwrap();
        assert_eq!(repo.load_code(&id).await.unwrap(), None);
        assert_eq!(repo.load_time_remaining(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn custom_prefix_changes_keys() {
        let store = InMemoryStore::new();
        let repo = SessionStateRepository::with_prefix(Arc::new(store.clone()), "practice");
        repo.save_code(&scenario("banking"), "pass").await.unwrap();
        assert!(store.get("practice-banking-code").await.unwrap().is_some());
        assert!(store.get("codeevolve-banking-code").await.unwrap().is_none());
    }
}
