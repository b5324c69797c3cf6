//! Topic rewrite behaviour through the public API
//!
//! Rules are loaded the way the binary loads them, from TOML, then resolved.

use mqttbridge::config::BridgeConfig;
use mqttbridge::mapping::{RewriteRule, RuleSet, TopicMapper};
use proptest::prelude::*;

fn rules_from_toml(mappings: &str) -> RuleSet {
    let document = format!(
        r#"
[broker_src]
client_id = "bridge-src"

[broker_dst]
client_id = "bridge-dst"

{mappings}
"#
    );
    BridgeConfig::from_toml_str(&document)
        .expect("valid test configuration")
        .rule_set()
}

#[test]
fn test_configured_rules_resolve_in_order() {
    let rules = rules_from_toml(
        r#"
[[mappings]]
src_topic = "home/kitchen/#"
dst_topic = "kitchen/#"

[[mappings]]
src_topic = "home/#"
dst_topic = "building1/#"

[[mappings]]
src_topic = "sensors/raw"
dst_topic = "sensors/clean"
"#,
    );

    assert_eq!(
        TopicMapper::resolve("home/kitchen/temp", &rules).as_deref(),
        Some("kitchen/temp")
    );
    assert_eq!(
        TopicMapper::resolve("home/hall/light", &rules).as_deref(),
        Some("building1/hall/light")
    );
    assert_eq!(
        TopicMapper::resolve("sensors/raw", &rules).as_deref(),
        Some("sensors/clean")
    );
    assert_eq!(TopicMapper::resolve("garden/light", &rules), None);
}

#[test]
fn test_subscription_patterns_follow_rule_order_without_duplicates() {
    let rules = rules_from_toml(
        r#"
[[mappings]]
src_topic = "b/#"
dst_topic = "x/#"

[[mappings]]
src_topic = "a/+/c"
dst_topic = "y/#"

[[mappings]]
src_topic = "a/#"
dst_topic = "z/#"

[[mappings]]
src_topic = "b/#"
dst_topic = "w/#"
"#,
    );

    assert_eq!(rules.subscription_patterns(), vec!["b/#", "a/#"]);
}

#[test]
fn test_recurring_prefix_only_first_occurrence_replaced() {
    let rules = RuleSet::new(vec![RewriteRule::new("a/#", "b/#")]);
    assert_eq!(
        TopicMapper::resolve("a/x/a/y", &rules).as_deref(),
        Some("b/x/a/y")
    );
}

proptest! {
    #[test]
    fn prop_unmatched_prefix_never_resolves(level in "[a-z]{1,8}", rest in "[a-z/]{0,16}") {
        let rules = RuleSet::new(vec![RewriteRule::new("home/#", "building1/#")]);
        let address = format!("x{level}/{rest}");
        prop_assert_eq!(TopicMapper::resolve(&address, &rules), None);
    }

    #[test]
    fn prop_wildcard_rule_keeps_suffix(suffix in "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}") {
        let rules = RuleSet::new(vec![RewriteRule::new("home/#", "building1/#")]);
        let resolved = TopicMapper::resolve(&format!("home/{suffix}"), &rules);
        prop_assert_eq!(resolved, Some(format!("building1/{suffix}")));
    }
}
