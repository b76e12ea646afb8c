//! Column resolution: mapping semantic roles onto physical columns.
//!
//! Resolution is a pure function over a table's column names. For each role
//! the vocabulary carries an ordered list of keyword groups; earlier groups
//! are more specific and win over later fallbacks. Within one group, every
//! alternative set must contribute at least one substring hit against the
//! normalized column name, which lets a role demand two independent keyword
//! families at once (a rating word AND a course word) before it will settle
//! for a looser single-keyword match.
//!
//! A role that resolves to no column is simply absent; downstream consumers
//! degrade by omitting the derived output.

use crate::{
    text,
    vocab::{KeywordGroup, Role, Vocabulary},
};

/// Resolves `role` to a column index, trying keyword groups in priority
/// order and columns in table order within each group.
pub fn resolve_index(columns: &[String], role: Role, vocab: &Vocabulary) -> Option<usize> {
    let normalized: Vec<String> = columns.iter().map(|c| text::normalize(c)).collect();
    for group in vocab.role_groups(role) {
        for (idx, name) in normalized.iter().enumerate() {
            if group_matches(name, group) {
                return Some(idx);
            }
        }
    }
    None
}

/// Resolves `role` to the physical column name.
pub fn resolve<'a>(columns: &'a [String], role: Role, vocab: &Vocabulary) -> Option<&'a str> {
    resolve_index(columns, role, vocab).map(|idx| columns[idx].as_str())
}

/// Every candidate column for `role` in priority order: groups outer,
/// table order inner, duplicates removed. Callers that need a secondary
/// acceptance test (e.g. population thresholds) walk this list instead of
/// taking the single best match.
pub fn resolve_all(columns: &[String], role: Role, vocab: &Vocabulary) -> Vec<usize> {
    let normalized: Vec<String> = columns.iter().map(|c| text::normalize(c)).collect();
    let mut out: Vec<usize> = Vec::new();
    for group in vocab.role_groups(role) {
        for (idx, name) in normalized.iter().enumerate() {
            if group_matches(name, group) && !out.contains(&idx) {
                out.push(idx);
            }
        }
    }
    out
}

/// Whether a free-text value (not a column name) satisfies any keyword group
/// of the role. Used when role markers hide inside cell data, e.g. a "CICLO"
/// question in long-format evaluations.
pub fn text_matches_role(value: &str, role: Role, vocab: &Vocabulary) -> bool {
    let normalized = text::normalize(value);
    vocab
        .role_groups(role)
        .iter()
        .any(|group| group_matches(&normalized, group))
}

fn group_matches(normalized_name: &str, group: &KeywordGroup) -> bool {
    !group.is_empty()
        && group.iter().all(|alternatives| {
            alternatives
                .iter()
                .any(|kw| normalized_name.contains(kw.as_str()))
        })
}
