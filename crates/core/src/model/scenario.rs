use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LevelId, ScenarioId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScenarioError {
    #[error("scenario must have at least one level")]
    NoLevels,

    #[error("scenario title cannot be empty")]
    EmptyTitle,

    #[error("duplicate level id {0} in scenario")]
    DuplicateLevel(LevelId),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(label)
    }
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// One stage of a scenario: prompt, starter source, and the hidden harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    id: LevelId,
    title: String,
    description: String,
    starter_code: String,
    test_code: String,
}

impl Level {
    #[must_use]
    pub fn new(
        id: LevelId,
        title: impl Into<String>,
        description: impl Into<String>,
        starter_code: impl Into<String>,
        test_code: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            starter_code: starter_code.into(),
            test_code: test_code.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> LevelId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Markdown prompt text.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn starter_code(&self) -> &str {
        &self.starter_code
    }

    #[must_use]
    pub fn test_code(&self) -> &str {
        &self.test_code
    }
}

//
// ─── SCENARIO ──────────────────────────────────────────────────────────────────
//

/// Unvalidated scenario as it appears in catalog input.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioDraft {
    pub id: ScenarioId,
    pub title: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub summary: String,
    pub levels: Vec<Level>,
}

impl ScenarioDraft {
    /// Validate the draft into an immutable scenario.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError` if the title is blank, there are no levels, or
    /// two levels share an id.
    pub fn validate(self) -> Result<Scenario, ScenarioError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ScenarioError::EmptyTitle);
        }
        if self.levels.is_empty() {
            return Err(ScenarioError::NoLevels);
        }

        let mut seen = HashSet::with_capacity(self.levels.len());
        for level in &self.levels {
            if !seen.insert(level.id()) {
                return Err(ScenarioError::DuplicateLevel(level.id()));
            }
        }

        Ok(Scenario {
            id: self.id,
            title,
            difficulty: self.difficulty,
            summary: self.summary.trim().to_string(),
            levels: self.levels,
        })
    }
}

/// A named multi-level assessment. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    id: ScenarioId,
    title: String,
    difficulty: Difficulty,
    summary: String,
    levels: Vec<Level>,
}

impl Scenario {
    /// Build a scenario directly.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError` under the same rules as `ScenarioDraft::validate`.
    pub fn new(
        id: ScenarioId,
        title: impl Into<String>,
        difficulty: Difficulty,
        summary: impl Into<String>,
        levels: Vec<Level>,
    ) -> Result<Self, ScenarioError> {
        ScenarioDraft {
            id,
            title: title.into(),
            difficulty,
            summary: summary.into(),
            levels,
        }
        .validate()
    }

    #[must_use]
    pub fn id(&self) -> &ScenarioId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    #[must_use]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    /// The first level always exists; validation rejects empty scenarios.
    #[must_use]
    pub fn first_level(&self) -> &Level {
        &self.levels[0]
    }

    #[must_use]
    pub fn last_index(&self) -> usize {
        self.levels.len() - 1
    }

    /// Starter source of the first level, used to seed and reset the buffer.
    #[must_use]
    pub fn starter_code(&self) -> &str {
        self.first_level().starter_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: u32) -> Level {
        Level::new(
            LevelId::new(id),
            format!("Level {id}"),
            "desc",
            format!("# starter {id}"),
            "print('ALL_TESTS_PASSED')",
        )
    }

    #[test]
    fn starter_code_comes_from_first_level() {
        let scenario = Scenario::new(
            ScenarioId::new("banking").unwrap(),
            "Banking",
            Difficulty::Medium,
            "ledger",
            vec![level(1), level(2)],
        )
        .unwrap();

        assert_eq!(scenario.starter_code(), "# starter 1");
        assert_eq!(scenario.last_index(), 1);
        assert!(scenario.level(2).is_none());
    }

    #[test]
    fn rejects_empty_level_list() {
        let err = Scenario::new(
            ScenarioId::new("empty").unwrap(),
            "Empty",
            Difficulty::Easy,
            "",
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err, ScenarioError::NoLevels);
    }

    #[test]
    fn rejects_duplicate_level_ids() {
        let err = Scenario::new(
            ScenarioId::new("dup").unwrap(),
            "Dup",
            Difficulty::Hard,
            "",
            vec![level(1), level(1)],
        )
        .unwrap_err();
        assert_eq!(err, ScenarioError::DuplicateLevel(LevelId::new(1)));
    }

    #[test]
    fn rejects_blank_title() {
        let err = Scenario::new(
            ScenarioId::new("blank").unwrap(),
            "  ",
            Difficulty::Easy,
            "",
            vec![level(1)],
        )
        .unwrap_err();
        assert_eq!(err, ScenarioError::EmptyTitle);
    }
}
