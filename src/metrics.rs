//! Derived categorical summaries over (possibly filtered) snapshots.
//!
//! Every function here degrades to "nothing" when its role does not resolve;
//! callers render an informational message instead of failing. The status
//! tally is the one output with a hard invariant: its counts always sum to
//! the row count of the table it was computed from.

use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    category::{self, Category},
    dataset::Table,
    roles,
    vocab::{Role, Vocabulary},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
}

const AGE_BUCKETS: &[(u32, &str)] = &[
    (18, "Até 18"),
    (25, "19-25"),
    (30, "26-30"),
    (35, "31-35"),
    (40, "36-40"),
    (45, "41-45"),
    (50, "46-50"),
    (60, "51-60"),
    (100, "Acima de 60"),
];

const MIN_PLAUSIBLE_AGE: u32 = 10;
const MAX_PLAUSIBLE_AGE: u32 = 100;

/// Counts students per canonical status. Rows whose status is missing or
/// unclassifiable land in the missing-status bucket, and any residue between
/// the bucket sum and the table length is absorbed by a synthetic row, so
/// the tally always conserves the total.
pub fn status_tally(table: &Table, vocab: &Vocabulary) -> Vec<CategoryCount> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut bump = |label: String| {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    };

    let normalized_col = table.column_index(&vocab.normalized_status_column);
    let raw_col = roles::resolve_index(table.columns(), Role::Status, vocab);
    for idx in 0..table.len() {
        let label = match (normalized_col, raw_col) {
            (Some(col), _) => table
                .cell(idx, col)
                .map(|v| v.to_string())
                .unwrap_or_else(|| vocab.missing_status_label.clone()),
            (None, Some(col)) => category::normalize_status(table.cell(idx, col), vocab)
                .map(Category::into_label)
                .unwrap_or_else(|| vocab.missing_status_label.clone()),
            (None, None) => vocab.missing_status_label.clone(),
        };
        bump(label);
    }

    let mut rows: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(label, count)| CategoryCount { label, count })
        .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)))
        .collect();

    let tallied: usize = rows.iter().map(|r| r.count).sum();
    if tallied < table.len() {
        rows.push(CategoryCount {
            label: vocab.residual_label.clone(),
            count: table.len() - tallied,
        });
    }
    rows
}

/// Buckets student ages. A direct age column wins when it yields any
/// plausible value; otherwise ages are computed from a birthdate column.
/// Buckets with zero count are omitted; `None` when no age source resolves.
pub fn age_buckets(table: &Table, today: NaiveDate, vocab: &Vocabulary) -> Option<Vec<CategoryCount>> {
    let ages = collect_ages(table, today, vocab)?;
    let mut counts = vec![0usize; AGE_BUCKETS.len()];
    for age in ages {
        if let Some(slot) = AGE_BUCKETS.iter().position(|(upper, _)| age <= *upper) {
            counts[slot] += 1;
        }
    }
    Some(
        AGE_BUCKETS
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|((_, label), count)| CategoryCount {
                label: (*label).to_string(),
                count,
            })
            .collect(),
    )
}

/// Income distribution in canonical bracket order, with open-ended leaf
/// categories appended by descending count. `None` when no income column
/// resolves or no value classifies.
pub fn income_distribution(table: &Table, vocab: &Vocabulary) -> Option<Vec<CategoryCount>> {
    let col = roles::resolve_index(table.columns(), Role::Income, vocab)?;
    let mut known: Vec<(usize, usize)> = Vec::new(); // (rule index, count)
    let mut other: Vec<(String, usize)> = Vec::new();
    for idx in 0..table.len() {
        match category::normalize_income(table.cell(idx, col), vocab) {
            Some(Category::Known(label)) => {
                let rule_idx = vocab
                    .income_rules
                    .iter()
                    .position(|r| r.label == label)
                    .unwrap_or(usize::MAX);
                match known.iter_mut().find(|(i, _)| *i == rule_idx) {
                    Some((_, n)) => *n += 1,
                    None => known.push((rule_idx, 1)),
                }
            }
            Some(Category::Other(label)) => match other.iter_mut().find(|(l, _)| *l == label) {
                Some((_, n)) => *n += 1,
                None => other.push((label, 1)),
            },
            None => {}
        }
    }
    if known.is_empty() && other.is_empty() {
        return None;
    }
    let mut rows: Vec<CategoryCount> = known
        .into_iter()
        .sorted_by_key(|(rule_idx, _)| *rule_idx)
        .map(|(rule_idx, count)| CategoryCount {
            label: vocab
                .income_rules
                .get(rule_idx)
                .map(|r| r.label.clone())
                .unwrap_or_default(),
            count,
        })
        .collect();
    rows.extend(
        other
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(label, count)| CategoryCount { label, count }),
    );
    Some(rows)
}

/// Raw distinct-value counts for any resolved role, descending by count.
/// The generic backing for gender/race/region/course breakdowns.
pub fn role_value_counts(
    table: &Table,
    role: Role,
    vocab: &Vocabulary,
) -> Option<Vec<CategoryCount>> {
    let col = roles::resolve_index(table.columns(), role, vocab)?;
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in table.column_values(col) {
        match counts.iter_mut().find(|(l, _)| l == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }
    if counts.is_empty() {
        return None;
    }
    Some(
        counts
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(label, count)| CategoryCount { label, count })
            .collect(),
    )
}

fn collect_ages(table: &Table, today: NaiveDate, vocab: &Vocabulary) -> Option<Vec<u32>> {
    for col in roles::resolve_all(table.columns(), Role::Age, vocab) {
        let ages: Vec<u32> = table
            .column_values(col)
            .filter_map(parse_age)
            .filter(|age| (MIN_PLAUSIBLE_AGE..=MAX_PLAUSIBLE_AGE).contains(age))
            .collect();
        if !ages.is_empty() {
            return Some(ages);
        }
    }
    let col = roles::resolve_index(table.columns(), Role::Birthdate, vocab)?;
    let ages: Vec<u32> = table
        .column_values(col)
        .filter_map(parse_birthdate)
        .map(|birth| age_at(birth, today))
        .filter_map(|age| u32::try_from(age).ok())
        .filter(|age| (MIN_PLAUSIBLE_AGE..=MAX_PLAUSIBLE_AGE).contains(age))
        .collect();
    if ages.is_empty() { None } else { Some(ages) }
}

fn parse_age(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    if let Ok(age) = trimmed.parse::<u32>() {
        return Some(age);
    }
    if let Ok(age) = trimmed.parse::<f64>()
        && age.fract() == 0.0
        && age >= 0.0
    {
        return Some(age as u32);
    }
    // "25 anos" style cells: take the leading digit run.
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Day-first formats take priority: the source sheets are Brazilian and
/// "03/04/1990" means April 3rd.
pub fn parse_birthdate(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%y", "%m/%d/%Y"];
    let token = value.trim().split_whitespace().next().unwrap_or("");
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(token, fmt) {
            return Some(parsed);
        }
    }
    None
}

fn age_at(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}
