//! Excluded path matching.
//!
//! A path is excluded when its rendered form equals an `exclude_paths` entry
//! or matches any `exclude_regex_paths` pattern.

use std::collections::BTreeSet;

use regex_lite::Regex;

use super::config::{ConfigError, DiffConfig};
use crate::types::Path;

/// Compiled path exclusions of one configuration.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    exact: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl PathFilter {
    /// Compile the configured exclusions.
    pub fn from_config(config: &DiffConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .exclude_regex_paths
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            exact: config.exclude_paths.clone(),
            patterns,
        })
    }

    /// True when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }

    /// Number of compiled patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// True when `path` must not be compared or reported.
    pub fn excludes(&self, path: &Path) -> bool {
        if self.is_empty() {
            return false;
        }
        let rendered = path.to_string();
        self.exact.contains(&rendered) || self.patterns.iter().any(|re| re.is_match(&rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PathComponent;

    #[test]
    fn test_exact_and_pattern_matches() {
        let config = DiffConfig::default()
            .with_exclude_path("root['meta']")
            .with_exclude_regex_path(r"\[\d+\]\['tmp'\]$");
        let filter = PathFilter::from_config(&config).unwrap();

        let meta = Path::root().child(PathComponent::Key("meta".into()));
        let tmp = Path::root()
            .child(PathComponent::Index(3))
            .child(PathComponent::Key("tmp".into()));
        let other = Path::root().child(PathComponent::Key("data".into()));

        assert!(filter.excludes(&meta));
        assert!(filter.excludes(&tmp));
        assert!(!filter.excludes(&other));
        assert_eq!(filter.pattern_count(), 1);
    }

    #[test]
    fn test_empty_filter_excludes_nothing() {
        let filter = PathFilter::from_config(&DiffConfig::default()).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.excludes(&Path::root()));
    }

    #[test]
    fn test_bad_pattern_is_a_config_error() {
        let config = DiffConfig::default().with_exclude_regex_path("([");
        assert!(matches!(
            PathFilter::from_config(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
