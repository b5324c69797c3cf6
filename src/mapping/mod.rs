//! Topic rewrite rules and matching

pub mod mapper;
pub mod rules;

pub use mapper::TopicMapper;
pub use rules::{PatternShape, RewriteRule, RuleSet};
