//! Rewrite rules and the ordered rule set
//!
//! A rule pairs a source topic pattern with a destination pattern. Patterns are
//! plain prefixes, optionally ending in the multi-level wildcard `#`. Rules whose
//! source pattern carries the single-level wildcard `+` are kept in the set (so
//! configuration order is untouched) but are never subscribed and never matched.

use serde::Deserialize;

/// Topic level separator
pub const TOPIC_SEPARATOR: char = '/';
/// Multi-level wildcard marker
pub const MULTI_LEVEL_WILDCARD: char = '#';
/// Single-level wildcard marker (unsupported in source patterns)
pub const SINGLE_LEVEL_WILDCARD: char = '+';

/// One `(source pattern, destination pattern)` pair from the `mappings` table
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RewriteRule {
    #[serde(rename = "src_topic")]
    pub source_pattern: String,
    #[serde(rename = "dst_topic")]
    pub destination_pattern: String,
}

/// Shape of a topic pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternShape {
    /// No wildcard at all, matched as a literal prefix
    Prefix,
    /// Prefix followed by a trailing `#`
    MultiLevel,
    /// Contains `+` somewhere; not supported
    SingleLevel,
}

impl PatternShape {
    pub fn classify(pattern: &str) -> Self {
        if pattern.contains(SINGLE_LEVEL_WILDCARD) {
            PatternShape::SingleLevel
        } else if pattern.ends_with(MULTI_LEVEL_WILDCARD) {
            PatternShape::MultiLevel
        } else {
            PatternShape::Prefix
        }
    }
}

/// Strip one trailing multi-level wildcard marker, if present
pub fn strip_wildcard(pattern: &str) -> &str {
    pattern
        .strip_suffix(MULTI_LEVEL_WILDCARD)
        .unwrap_or(pattern)
}

/// `#` may only appear once, as the whole pattern or as the last level
pub fn has_valid_multi_level_wildcard(pattern: &str) -> bool {
    match pattern.matches(MULTI_LEVEL_WILDCARD).count() {
        0 => true,
        1 => pattern == "#" || pattern.ends_with("/#"),
        _ => false,
    }
}

impl RewriteRule {
    pub fn new<S: Into<String>, D: Into<String>>(source: S, destination: D) -> Self {
        Self {
            source_pattern: source.into(),
            destination_pattern: destination.into(),
        }
    }

    pub fn source_shape(&self) -> PatternShape {
        PatternShape::classify(&self.source_pattern)
    }

    /// Whether this rule may be subscribed and matched
    pub fn is_supported(&self) -> bool {
        self.source_shape() != PatternShape::SingleLevel
    }
}

/// Ordered, immutable list of rewrite rules. First match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// Rules eligible for matching, in configuration order
    pub fn active_rules(&self) -> impl Iterator<Item = &RewriteRule> {
        self.rules.iter().filter(|rule| rule.is_supported())
    }

    /// Rules excluded because their source pattern uses `+`
    pub fn skipped_rules(&self) -> impl Iterator<Item = &RewriteRule> {
        self.rules.iter().filter(|rule| !rule.is_supported())
    }

    /// Source patterns to subscribe on every (re)connect.
    ///
    /// Ordered by first appearance, duplicates removed.
    pub fn subscription_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        for rule in self.active_rules() {
            if !patterns.contains(&rule.source_pattern) {
                patterns.push(rule.source_pattern.clone());
            }
        }
        patterns
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<RewriteRule>> for RuleSet {
    fn from(rules: Vec<RewriteRule>) -> Self {
        Self::new(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pattern_shapes() {
        assert_eq!(PatternShape::classify("home"), PatternShape::Prefix);
        assert_eq!(PatternShape::classify("home/"), PatternShape::Prefix);
        assert_eq!(PatternShape::classify("home/#"), PatternShape::MultiLevel);
        assert_eq!(PatternShape::classify("#"), PatternShape::MultiLevel);
        assert_eq!(PatternShape::classify("home/+/temp"), PatternShape::SingleLevel);
        // `+` wins even when the pattern also ends in `#`
        assert_eq!(PatternShape::classify("home/+/#"), PatternShape::SingleLevel);
    }

    #[test]
    fn test_strip_wildcard() {
        assert_eq!(strip_wildcard("home/#"), "home/");
        assert_eq!(strip_wildcard("#"), "");
        assert_eq!(strip_wildcard("home"), "home");
        assert_eq!(strip_wildcard("home/"), "home/");
    }

    #[test]
    fn test_multi_level_wildcard_position() {
        assert!(has_valid_multi_level_wildcard("home"));
        assert!(has_valid_multi_level_wildcard("#"));
        assert!(has_valid_multi_level_wildcard("home/#"));
        assert!(!has_valid_multi_level_wildcard("home#"));
        assert!(!has_valid_multi_level_wildcard("home/#/temp"));
        assert!(!has_valid_multi_level_wildcard("a/#/#"));
    }

    #[test]
    fn test_subscription_patterns_skip_single_level_and_dedupe() {
        let rules = RuleSet::new(vec![
            RewriteRule::new("home/#", "a/#"),
            RewriteRule::new("home/+/temp", "b/#"),
            RewriteRule::new("office", "c"),
            RewriteRule::new("home/#", "d/#"),
        ]);

        assert_eq!(rules.subscription_patterns(), vec!["home/#", "office"]);
        assert_eq!(rules.skipped_rules().count(), 1);
        assert_eq!(rules.active_rules().count(), 3);
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn test_rule_deserializes_from_mapping_keys() {
        let rule: RewriteRule =
            toml::from_str("src_topic = \"home/#\"\ndst_topic = \"out\"").unwrap();
        assert_eq!(rule, RewriteRule::new("home/#", "out"));
    }
}
