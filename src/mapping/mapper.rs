//! Topic rewriting
//!
//! Pure, side-effect free resolution of an inbound address against a [`RuleSet`].

use super::rules::{strip_wildcard, PatternShape, RuleSet, TOPIC_SEPARATOR};

/// Resolves inbound addresses to outbound addresses
pub struct TopicMapper;

impl TopicMapper {
    /// Rewrite `address` with the first matching rule, or `None` when no rule matches.
    ///
    /// The source prefix is substituted once, at its first occurrence. A prefix
    /// that recurs later in the address is left alone.
    pub fn resolve(address: &str, rules: &RuleSet) -> Option<String> {
        for rule in rules.active_rules() {
            let src_prefix = strip_wildcard(&rule.source_pattern);
            if !address.starts_with(src_prefix) {
                continue;
            }

            let mut dst_prefix = strip_wildcard(&rule.destination_pattern).to_string();
            // An empty destination means "drop the prefix", no separator to add
            if rule.source_shape() == PatternShape::MultiLevel
                && !dst_prefix.is_empty()
                && !dst_prefix.ends_with(TOPIC_SEPARATOR)
            {
                dst_prefix.push(TOPIC_SEPARATOR);
            }

            return Some(address.replacen(src_prefix, &dst_prefix, 1));
        }

        None
    }
}
