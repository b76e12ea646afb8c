//! Canonical category bucketing for free-text status and income answers.
//!
//! Raw values map many-to-one onto curated labels through the vocabulary's
//! ordered rule tables; first match wins. Anything that falls through every
//! rule is preserved as an [`Category::Other`] leaf rather than discarded, so
//! the category set stays open-ended while downstream code can still tell
//! curated buckets from long-tail ones.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::{
    text,
    vocab::{CategoryRule, Vocabulary},
};

/// Result of classifying one raw value: a curated canonical label, or the
/// original text carried through with title-case capitalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Category {
    Known(String),
    Other(String),
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Category::Known(label) | Category::Other(label) => label,
        }
    }

    pub fn into_label(self) -> String {
        match self {
            Category::Known(label) | Category::Other(label) => label,
        }
    }
}

/// Classifies a status cell. Missing and placeholder input yields `None`;
/// the caller decides how to label unclassifiable rows.
pub fn normalize_status(raw: Option<&str>, vocab: &Vocabulary) -> Option<Category> {
    let raw = raw?;
    let normalized = text::normalize(raw);
    if is_placeholder(&normalized, vocab) {
        return None;
    }
    for rule in &vocab.status_rules {
        if rule_matches(&normalized, rule) {
            return Some(Category::Known(rule.label.clone()));
        }
    }
    Some(Category::Other(text::fold_upper(raw)))
}

/// Classifies an income cell against the ordered bracket table. After the
/// pattern rules, a digit-group fallback recognizes "N ... M" ranges and
/// single amounts at or above the open-ended top bracket.
pub fn normalize_income(raw: Option<&str>, vocab: &Vocabulary) -> Option<Category> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    let normalized = text::normalize(raw);
    if is_placeholder(&normalized, vocab) {
        return None;
    }
    let stripped = text::strip_filler_words(&normalized, &vocab.income_fillers);
    for rule in &vocab.income_rules {
        if rule_matches(&stripped, rule) {
            return Some(Category::Known(rule.label.clone()));
        }
    }
    if stripped.contains(vocab.wage_marker.as_str())
        && let Some(label) = bracket_from_digits(&stripped, &vocab.income_rules)
    {
        return Some(Category::Known(label));
    }
    Some(Category::Other(text::title_case(raw)))
}

fn rule_matches(normalized: &str, rule: &CategoryRule) -> bool {
    !rule.any.is_empty()
        && rule.any.iter().any(|p| normalized.contains(p.as_str()))
        && rule.all.iter().all(|p| normalized.contains(p.as_str()))
        && !rule.none.iter().any(|p| normalized.contains(p.as_str()))
}

fn bracket_from_digits(normalized: &str, rules: &[CategoryRule]) -> Option<String> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("digit pattern"));
    let numbers: Vec<u64> = digits
        .find_iter(normalized)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    match numbers.as_slice() {
        [low, high, ..] => rules
            .iter()
            .find(|rule| rule.span == Some((*low, Some(*high))))
            .map(|rule| rule.label.clone()),
        [single] => rules
            .iter()
            .find(|rule| matches!(rule.span, Some((floor, None)) if *single >= floor))
            .map(|rule| rule.label.clone()),
        [] => None,
    }
}

fn is_placeholder(normalized: &str, vocab: &Vocabulary) -> bool {
    vocab
        .placeholder_tokens
        .iter()
        .any(|token| token == normalized)
}
