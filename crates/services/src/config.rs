use std::env;
use std::time::Duration;

use assess_core::time::DEFAULT_TIME_BUDGET_SECS;
use storage::session_state::DEFAULT_KEY_PREFIX;

/// Session tuning knobs. Defaults match the standard assessment format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssessmentConfig {
    /// Budget for a scenario with no persisted timer.
    pub time_budget_secs: u32,
    /// Period of the countdown tick; each tick removes one second.
    pub tick_period: Duration,
    /// Namespace for persisted keys.
    pub key_prefix: String,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: DEFAULT_TIME_BUDGET_SECS,
            tick_period: Duration::from_secs(1),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl AssessmentConfig {
    /// Defaults overridden by `ASSESS_TIME_BUDGET_SECS`, `ASSESS_TICK_MILLIS`
    /// and `ASSESS_KEY_PREFIX`. Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = lookup("ASSESS_TIME_BUDGET_SECS").and_then(|v| v.trim().parse().ok()) {
            config.time_budget_secs = secs;
        }
        if let Some(millis) = lookup("ASSESS_TICK_MILLIS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|millis| *millis > 0)
        {
            config.tick_period = Duration::from_millis(millis);
        }
        if let Some(prefix) = lookup("ASSESS_KEY_PREFIX")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            config.key_prefix = prefix;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_seventy_minutes() {
        let config = AssessmentConfig::from_lookup(lookup(&[]));
        assert_eq!(config.time_budget_secs, 4200);
        assert_eq!(config.tick_period, Duration::from_secs(1));
        assert_eq!(config.key_prefix, "codeevolve");
    }

    #[test]
    fn reads_overrides() {
        let config = AssessmentConfig::from_lookup(lookup(&[
            ("ASSESS_TIME_BUDGET_SECS", "600"),
            ("ASSESS_TICK_MILLIS", "250"),
            ("ASSESS_KEY_PREFIX", "practice"),
        ]));
        assert_eq!(config.time_budget_secs, 600);
        assert_eq!(config.tick_period, Duration::from_millis(250));
        assert_eq!(config.key_prefix, "practice");
    }

    #[test]
    fn ignores_garbage() {
        let config = AssessmentConfig::from_lookup(lookup(&[
            ("ASSESS_TIME_BUDGET_SECS", "seventy"),
            ("ASSESS_TICK_MILLIS", "0"),
            ("ASSESS_KEY_PREFIX", "  "),
        ]));
        assert_eq!(config, AssessmentConfig::default());
    }
}
