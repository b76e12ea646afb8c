//! Cross-dataset filter propagation.
//!
//! A [`FilterSelection`] names at most one value per dimension (cycle,
//! location, status, gender). Each dimension narrows its primary table by a
//! direct column match, then propagates the restriction to tables lacking
//! that column through soft keys: column pairs whose names share an
//! identifying keyword (email, name, CPF, phone). Propagation that finds no
//! usable key pair is skipped silently — an unfiltered secondary table is
//! the accepted degradation, never an error.
//!
//! Evaluations rarely carry a cycle column; the cycle is recovered from the
//! survey-name text ("2º CICLO - ..."), defaulting to cycle "1" for program
//! evaluations without an explicit number. A cycle selection that matches
//! nothing under every extraction method leaves the evaluations table
//! unfiltered: an imperfect cycle filter is worse than none.

use std::collections::HashSet;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    category::{self, Category},
    dataset::Table,
    pivot::clean_cycle_value,
    roles, text,
    vocab::{Role, Vocabulary},
};

/// One filter dimension: unconstrained, or a concrete value drawn from the
/// original snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    #[default]
    All,
    Value(String),
}

impl Selection {
    pub fn value(&self) -> Option<&str> {
        match self {
            Selection::All => None,
            Selection::Value(v) => Some(v),
        }
    }
}

impl From<Option<String>> for Selection {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Selection::Value(v),
            _ => Selection::All,
        }
    }
}

/// The full selection tuple, applied cycle → location → status → gender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub cycle: Selection,
    pub location: Selection,
    pub status: Selection,
    pub gender: Selection,
}

impl FilterSelection {
    pub fn is_unconstrained(&self) -> bool {
        self.cycle == Selection::All
            && self.location == Selection::All
            && self.status == Selection::All
            && self.gender == Selection::All
    }
}

/// Applies the selection to the students and enrollments snapshots,
/// propagating each narrowing across the pair. Always returns new tables.
pub fn apply_filters(
    students: &Table,
    enrollments: &Table,
    selection: &FilterSelection,
    vocab: &Vocabulary,
) -> (Table, Table) {
    let mut students_f = students.clone();
    let mut enrollments_f = enrollments.clone();

    if let Some(cycle) = selection.cycle.value() {
        let wanted = clean_cycle_value(cycle);
        if let Some(col) = roles::resolve_index(students_f.columns(), Role::Cycle, vocab) {
            students_f =
                students_f.filter_rows(|idx| cell_cycle_matches(&students_f, idx, col, &wanted));
            if let Some(col) =
                roles::resolve_index(enrollments_f.columns(), Role::Cycle, vocab)
            {
                enrollments_f = enrollments_f
                    .filter_rows(|idx| cell_cycle_matches(&enrollments_f, idx, col, &wanted));
            }
            enrollments_f = propagate(&students_f, &enrollments_f, vocab);
        }
    }

    if let Some(location) = selection.location.value()
        && let Some(col) = roles::resolve_index(students_f.columns(), Role::Local, vocab)
    {
        students_f = students_f
            .filter_rows(|idx| students_f.cell(idx, col).is_some_and(|v| v == location));
        enrollments_f = filter_by_region(&enrollments_f, location, vocab);
    }

    if let Some(status) = selection.status.value() {
        let accepted = status_acceptance_set(status);
        if let Some(col) = students_f.column_index(&vocab.normalized_status_column) {
            students_f = students_f.filter_rows(|idx| {
                students_f
                    .cell(idx, col)
                    .is_some_and(|v| accepted.contains(&text::fold_upper(v)))
            });
        } else if let Some(col) = roles::resolve_index(students_f.columns(), Role::Status, vocab)
        {
            students_f = students_f.filter_rows(|idx| {
                let cell = students_f.cell(idx, col);
                let canonical = category::normalize_status(cell, vocab)
                    .map(Category::into_label)
                    .map(|l| text::fold_upper(&l));
                canonical.is_some_and(|l| accepted.contains(&l))
                    || cell.is_some_and(|v| accepted.contains(&text::fold_upper(v)))
            });
        }
        enrollments_f = propagate(&students_f, &enrollments_f, vocab);
    }

    if let Some(gender) = selection.gender.value() {
        let wanted = text::fold_upper(gender);
        if let Some(col) = roles::resolve_index(enrollments_f.columns(), Role::Gender, vocab) {
            enrollments_f = enrollments_f.filter_rows(|idx| {
                enrollments_f
                    .cell(idx, col)
                    .is_some_and(|v| text::fold_upper(v) == wanted)
            });
        }
        if let Some(col) = roles::resolve_index(students_f.columns(), Role::Gender, vocab) {
            students_f = students_f.filter_rows(|idx| {
                students_f
                    .cell(idx, col)
                    .is_some_and(|v| text::fold_upper(v) == wanted)
            });
        }
    }

    (students_f, enrollments_f)
}

/// Restricts the evaluations table to the active selection: by extracted
/// cycle first, then by soft-key membership against the already-filtered
/// students and enrollments. Falls back to the unfiltered table rather than
/// returning an empty one when only the cycle filter is active.
pub fn filter_evaluations(
    evaluations: &Table,
    students_filtered: &Table,
    enrollments_filtered: &Table,
    students_original: &Table,
    enrollments_original: &Table,
    selection: &FilterSelection,
    vocab: &Vocabulary,
) -> Table {
    if evaluations.is_empty() {
        return evaluations.clone();
    }
    let mut filtered = evaluations.clone();
    let cycle_wanted = selection.cycle.value().map(clean_cycle_value);

    if let Some(wanted) = &cycle_wanted {
        let mask = cycle_mask(&filtered, wanted, vocab);
        if mask.iter().any(|m| *m) {
            filtered = filtered.filter_rows(|idx| mask[idx]);
        } else {
            debug!("cycle '{wanted}' matched no evaluation rows; keeping all");
        }
    }

    let others_active = students_filtered.len() != students_original.len()
        || enrollments_filtered.len() != enrollments_original.len();
    if !others_active {
        return filtered;
    }

    let link_values = collect_link_values(&[students_filtered, enrollments_filtered], vocab);
    let id_col = filtered.columns().iter().position(|name| {
        let normalized = link_norm(name);
        vocab
            .respondent_keys
            .iter()
            .any(|k| normalized.contains(k.as_str()))
    });
    if let Some(col) = id_col
        && !link_values.is_empty()
    {
        filtered = filtered.filter_rows(|idx| {
            filtered
                .cell(idx, col)
                .is_some_and(|v| link_values.contains(&text::fold_upper(v)))
        });
    }

    if filtered.is_empty()
        && let Some(wanted) = &cycle_wanted
    {
        let mask = cycle_mask(evaluations, wanted, vocab);
        if mask.iter().any(|m| *m) {
            return evaluations.filter_rows(|idx| mask[idx]);
        }
    }
    filtered
}

/// Extracts a cycle number from a survey name. "2º CICLO - Avaliação MCOM"
/// yields "2"; a program evaluation without explicit cycle digits defaults
/// to "1"; anything else yields nothing.
pub fn extract_cycle_from_survey(value: &str, vocab: &Vocabulary) -> Option<String> {
    static CYCLE: OnceLock<Regex> = OnceLock::new();
    let pattern = CYCLE.get_or_init(|| {
        Regex::new(r"(\d+)\s*[ºo°]?\s*ciclo").expect("cycle pattern")
    });
    let normalized = text::normalize(value);
    if let Some(captures) = pattern.captures(&normalized) {
        return Some(captures[1].to_string());
    }
    let is_program_evaluation = normalized.contains(vocab.evaluation_marker.as_str())
        && vocab
            .program_markers
            .iter()
            .any(|m| normalized.contains(m.as_str()));
    is_program_evaluation.then(|| "1".to_string())
}

fn cell_cycle_matches(table: &Table, idx: usize, col: usize, wanted: &str) -> bool {
    table
        .cell(idx, col)
        .is_some_and(|v| clean_cycle_value(v) == wanted)
}

/// Per-row cycle acceptance over every extraction method: any cycle-like
/// column by cleaned equality, plus the survey-name extraction.
fn cycle_mask(table: &Table, wanted: &str, vocab: &Vocabulary) -> Vec<bool> {
    let mut mask = vec![false; table.len()];
    for col in roles::resolve_all(table.columns(), Role::Cycle, vocab) {
        for (idx, slot) in mask.iter_mut().enumerate() {
            if cell_cycle_matches(table, idx, col, wanted) {
                *slot = true;
            }
        }
    }
    if let Some(col) = roles::resolve_index(table.columns(), Role::Survey, vocab) {
        for (idx, slot) in mask.iter_mut().enumerate() {
            if table
                .cell(idx, col)
                .and_then(|v| extract_cycle_from_survey(v, vocab))
                .is_some_and(|c| c == wanted)
            {
                *slot = true;
            }
        }
    }
    mask
}

/// "CURSANDO + CONCLUÍDO" expands to a two-element acceptance set.
fn status_acceptance_set(selection: &str) -> HashSet<String> {
    selection
        .split(" + ")
        .map(text::fold_upper)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Region-vocabulary location match for tables without an exact location
/// column: a row passes when any location-like column contains one of the
/// region names found inside the selected value (or the whole value when no
/// known region name occurs). Applied only when it matches at least one row.
fn filter_by_region(table: &Table, location: &str, vocab: &Vocabulary) -> Table {
    let keywords = region_keywords(location, vocab);
    let candidate_cols = roles::resolve_all(table.columns(), Role::Region, vocab);
    if candidate_cols.is_empty() {
        return table.clone();
    }
    let mask: Vec<bool> = (0..table.len())
        .map(|idx| {
            candidate_cols.iter().any(|col| {
                table.cell(idx, *col).is_some_and(|v| {
                    let normalized = text::normalize(v);
                    keywords.iter().any(|kw| normalized.contains(kw.as_str()))
                })
            })
        })
        .collect();
    if mask.iter().any(|m| *m) {
        table.filter_rows(|idx| mask[idx])
    } else {
        debug!("location '{location}' matched no rows by region vocabulary; keeping all");
        table.clone()
    }
}

fn region_keywords(location: &str, vocab: &Vocabulary) -> Vec<String> {
    let normalized = text::normalize(location);
    let known: Vec<String> = vocab
        .regions
        .iter()
        .filter(|region| normalized.contains(region.as_str()))
        .cloned()
        .collect();
    if known.is_empty() {
        vec![normalized]
    } else {
        known
    }
}

/// Keeps the secondary rows whose soft-key value appears in the filtered
/// primary. Soft keys are column pairs with equal normalized names or names
/// sharing an identifying keyword; with no usable pair the secondary table
/// is returned unchanged.
fn propagate(primary: &Table, secondary: &Table, vocab: &Vocabulary) -> Table {
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (p_idx, p_name) in primary.columns().iter().enumerate() {
        let p_norm = link_norm(p_name);
        for (s_idx, s_name) in secondary.columns().iter().enumerate() {
            let s_norm = link_norm(s_name);
            let shared_key = vocab
                .link_keys
                .iter()
                .any(|k| p_norm.contains(k.as_str()) && s_norm.contains(k.as_str()));
            if p_norm == s_norm || shared_key {
                pairs.push((p_idx, s_idx));
                break;
            }
        }
    }
    if pairs.is_empty() {
        debug!("no shared identifying columns; skipping propagation");
        return secondary.clone();
    }
    let mut values: HashSet<String> = HashSet::new();
    for (p_idx, _) in &pairs {
        values.extend(primary.column_values(*p_idx).map(text::fold_upper));
    }
    if values.is_empty() {
        return secondary.clone();
    }
    secondary.filter_rows(|idx| {
        pairs.iter().any(|(_, s_idx)| {
            secondary
                .cell(idx, *s_idx)
                .is_some_and(|v| values.contains(&text::fold_upper(v)))
        })
    })
}

fn collect_link_values(tables: &[&Table], vocab: &Vocabulary) -> HashSet<String> {
    let mut values = HashSet::new();
    for table in tables {
        for (idx, name) in table.columns().iter().enumerate() {
            let normalized = link_norm(name);
            if vocab
                .link_keys
                .iter()
                .any(|k| normalized.contains(k.as_str()))
            {
                values.extend(table.column_values(idx).map(text::fold_upper));
            }
        }
    }
    values
}

/// Normalized column name with hyphens removed, so "E-mail" and "email"
/// spellings land on the same identifying keyword.
fn link_norm(name: &str) -> String {
    text::normalize(name).replace('-', "")
}
