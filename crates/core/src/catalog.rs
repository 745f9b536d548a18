use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Scenario, ScenarioDraft, ScenarioError, ScenarioId};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid scenario {id}: {source}")]
    Scenario {
        id: ScenarioId,
        #[source]
        source: ScenarioError,
    },

    #[error("duplicate scenario id {0}")]
    DuplicateScenario(ScenarioId),
}

/// Ordered, read-only collection of scenarios.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    scenarios: Vec<Arc<Scenario>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogInput {
    List(Vec<ScenarioDraft>),
    Wrapped { scenarios: Vec<ScenarioDraft> },
}

impl Catalog {
    /// Build a catalog from validated scenarios, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateScenario` if two scenarios share an id.
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(scenarios.len());
        for scenario in &scenarios {
            if !seen.insert(scenario.id().clone()) {
                return Err(CatalogError::DuplicateScenario(scenario.id().clone()));
            }
        }
        Ok(Self {
            scenarios: scenarios.into_iter().map(Arc::new).collect(),
        })
    }

    /// Parse a catalog from JSON: either a bare array of scenarios or an
    /// object with a `scenarios` array.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if parsing or scenario validation fails.
    pub fn from_json(input: &str) -> Result<Self, CatalogError> {
        let drafts = match serde_json::from_str::<CatalogInput>(input)? {
            CatalogInput::List(drafts) | CatalogInput::Wrapped { scenarios: drafts } => drafts,
        };

        let scenarios = drafts
            .into_iter()
            .map(|draft| {
                let id = draft.id.clone();
                draft
                    .validate()
                    .map_err(|source| CatalogError::Scenario { id, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(scenarios)
    }

    #[must_use]
    pub fn get(&self, id: &ScenarioId) -> Option<Arc<Scenario>> {
        self.scenarios
            .iter()
            .find(|scenario| scenario.id() == id)
            .map(Arc::clone)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Scenario>> {
        self.scenarios.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, LevelId};

    const SAMPLE: &str = r#"
    [
      {
        "id": "squares",
        "title": "Squares",
        "difficulty": "Easy",
        "summary": "Square numbers.",
        "levels": [
          {
            "id": 1,
            "title": "Level 1",
            "description": "Implement `f`.",
            "starterCode": "def f(x): pass",
            "testCode": "assert f(2) == 4\nprint('ALL_TESTS_PASSED')"
          },
          {
            "id": 2,
            "title": "Level 2",
            "description": "Implement `g`.",
            "starterCode": "def g(x): pass",
            "testCode": "assert g(2) == 8\nprint('ALL_TESTS_PASSED')"
          }
        ]
      }
    ]
    "#;

    #[test]
    fn parses_catalog_input_shape() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 1);

        let scenario = catalog.get(&ScenarioId::new("squares").unwrap()).unwrap();
        assert_eq!(scenario.difficulty(), Difficulty::Easy);
        assert_eq!(scenario.level_count(), 2);
        assert_eq!(scenario.first_level().id(), LevelId::new(1));
        assert_eq!(scenario.starter_code(), "def f(x): pass");
        assert!(scenario.level(1).unwrap().test_code().contains("ALL_TESTS_PASSED"));
    }

    #[test]
    fn accepts_wrapped_form() {
        let wrapped = format!("{{\"scenarios\": {SAMPLE}}}");
        assert_eq!(Catalog::from_json(&wrapped).unwrap().len(), 1);
    }

    #[test]
    fn rejects_duplicate_scenarios() {
        let trimmed = SAMPLE.trim();
        let body = &trimmed[1..trimmed.len() - 1];
        let doubled = format!("[{body},{body}]");
        let err = Catalog::from_json(&doubled).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateScenario(_)));
    }

    #[test]
    fn reports_invalid_scenario_by_id() {
        let input = r#"[{"id": "empty", "title": "Empty", "difficulty": "Hard", "levels": []}]"#;
        let err = Catalog::from_json(input).unwrap_err();
        match err {
            CatalogError::Scenario { id, source } => {
                assert_eq!(id.as_str(), "empty");
                assert_eq!(source, ScenarioError::NoLevels);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_scenario_is_none() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        assert!(catalog.get(&ScenarioId::new("missing").unwrap()).is_none());
    }
}
