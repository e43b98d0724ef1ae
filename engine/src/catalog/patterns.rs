//! Glob filters for component names, categories and servers

use glob_match::glob_match;

/// A comma-separated list of case-insensitive glob patterns.
///
/// An empty set matches everything.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<String>,
}

impl PatternSet {
    pub fn parse(raw: Option<&str>) -> Self {
        let patterns = raw
            .unwrap_or_default()
            .split(',')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let value = value.to_lowercase();
        self.patterns.iter().any(|p| glob_match(p, &value))
    }
}
