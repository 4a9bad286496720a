//! Built-in agent behaviors for the standard crew roles
//!
//! Each behavior pairs bilingual keyword and pattern scoring with a set
//! of canned domain playbooks. Requests that fall outside the playbooks
//! are answered through the behavior's [`ModelClient`](crate::model::ModelClient)
//! with a role-specific prompt, so a behavior stays useful even for
//! requests its rule tables never anticipated.
//!
//! The coordinator role lives in [`crate::coordinator`] since it is
//! entangled with the collaboration machinery rather than a domain
//! playbook.

pub mod field_service;
pub mod manager;
pub mod sales;
pub mod support;

pub use field_service::FieldServiceBehavior;
pub use manager::ManagerBehavior;
pub use sales::SalesBehavior;
pub use support::SupportBehavior;

use regex::Regex;

/// True when any of the words occurs in the lowercased content.
pub(crate) fn contains_any(content: &str, words: &[&str]) -> bool {
    words.iter().any(|word| content.contains(word))
}

/// Keyword component of a can-handle score: 0.15 per match, capped at 0.6.
pub(crate) fn keyword_score(content: &str, keywords: &[&str]) -> f64 {
    let matches = keywords.iter().filter(|k| content.contains(*k)).count();
    (matches as f64 * 0.15).min(0.6)
}

/// Pattern component of a can-handle score: 0.2 per matching pattern.
pub(crate) fn pattern_score(content: &str, patterns: &[Regex]) -> f64 {
    patterns.iter().filter(|p| p.is_match(content)).count() as f64 * 0.2
}
