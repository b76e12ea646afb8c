//! Long-to-wide reshaping of evaluation tables.
//!
//! Survey exports often arrive in long form: one row per answered question,
//! grouped runs of rows belonging to one respondent's submission. The engine
//! detects that shape by the presence of a question column, numbers the
//! submissions by watching the first question recur, and reshapes into one
//! row per submission with one column per distinct question.
//!
//! Cycle answers and the survey-name field are harvested into side maps
//! before reshaping (the reshape would otherwise scatter them across
//! question columns) and reattached as ordinary columns afterwards.
//!
//! Reshaping never fails outwards: an ordered list of strategies is tried in
//! sequence and the original table is returned unchanged when all of them
//! give up.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::{
    dataset::Table,
    roles, text,
    vocab::{Role, Vocabulary},
};

#[derive(Debug, Error)]
enum ReshapeError {
    #[error("duplicate answer for group {group} question '{question}'")]
    DuplicateCell { group: usize, question: String },
    #[error("no rows carry both a question and an answer")]
    Degenerate,
}

/// One (submission, question, answer) observation extracted from the long
/// table.
struct LongEntry {
    group: usize,
    question: String,
    answer: String,
}

/// Reshapes a long-format evaluations table into wide form. Tables without a
/// question column are already wide and pass through untouched.
pub fn pivot(evaluations: &Table, vocab: &Vocabulary) -> Table {
    if evaluations.is_empty() {
        return evaluations.clone();
    }
    let columns = evaluations.columns();
    let Some(question_col) = roles::resolve_index(columns, Role::Question, vocab) else {
        return evaluations.clone();
    };
    let Some(answer_col) = resolve_answer_column(evaluations, vocab) else {
        debug!("long-format evaluations without a usable answer column; keeping input");
        return evaluations.clone();
    };

    let respondent_col = roles::resolve_index(columns, Role::Respondent, vocab);
    let groups = assign_response_groups(evaluations, question_col, respondent_col);
    let group_count = groups.iter().copied().max().map(|g| g + 1).unwrap_or(0);

    let cycle_by_group = harvest_cycle_answers(evaluations, &groups, question_col, answer_col, vocab);
    let survey_col = roles::resolve_index(columns, Role::Survey, vocab);
    let survey_by_group = survey_col
        .map(|col| harvest_first_values(evaluations, &groups, col))
        .unwrap_or_default();

    let entries: Vec<LongEntry> = evaluations
        .rows()
        .iter()
        .enumerate()
        .filter_map(|(idx, _)| {
            let question = evaluations.cell(idx, question_col)?;
            let answer = evaluations.cell(idx, answer_col)?;
            Some(LongEntry {
                group: groups[idx],
                question: question.to_string(),
                answer: answer.to_string(),
            })
        })
        .collect();

    let strategies: &[(&str, ReshapeFn)] = &[
        ("strict", reshape_strict),
        ("first-wins", reshape_first_wins),
        ("group-first", reshape_group_first),
    ];
    let survey_name = survey_col.map(|col| evaluations.columns()[col].clone());
    for (name, strategy) in strategies {
        match strategy(&entries, group_count) {
            Ok(wide) => {
                debug!("pivot succeeded with {name} strategy");
                return attach_side_columns(
                    wide,
                    &cycle_by_group,
                    &survey_by_group,
                    survey_name,
                    vocab,
                );
            }
            Err(err) => debug!("pivot strategy {name} failed: {err}"),
        }
    }
    evaluations.clone()
}

/// Whether a table still carries a question column (i.e. is in long form).
pub fn is_long_format(table: &Table, vocab: &Vocabulary) -> bool {
    roles::resolve_index(table.columns(), Role::Question, vocab).is_some()
}

/// Numbers each row with its submission group: the flag "this row repeats
/// the table's very first question" is cumulatively summed, scoped per
/// respondent when a respondent column resolves, so every recurrence of the
/// opening question starts a new group.
fn assign_response_groups(
    table: &Table,
    question_col: usize,
    respondent_col: Option<usize>,
) -> Vec<usize> {
    let first_question = table.cell(0, question_col).unwrap_or("");
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut ids: HashMap<(String, usize), usize> = HashMap::new();
    let mut out = Vec::with_capacity(table.len());
    for idx in 0..table.len() {
        let respondent = respondent_col
            .and_then(|col| table.cell(idx, col))
            .unwrap_or("")
            .to_string();
        let counter = counters.entry(respondent.clone()).or_insert(0);
        if table.cell(idx, question_col).unwrap_or("") == first_question {
            *counter += 1;
        }
        let key = (respondent, *counter);
        let next_id = ids.len();
        let id = *ids.entry(key).or_insert(next_id);
        out.push(id);
    }
    out
}

/// Picks the answer-value column: the first free-text answer candidate
/// populated in more than 10% of rows, else the displayed-name column.
fn resolve_answer_column(table: &Table, vocab: &Vocabulary) -> Option<usize> {
    let threshold = table.len() / 10;
    for idx in roles::resolve_all(table.columns(), Role::FreeTextAnswer, vocab) {
        let populated = table.column_values(idx).count();
        if populated > threshold {
            return Some(idx);
        }
    }
    roles::resolve_index(table.columns(), Role::DisplayName, vocab)
}

/// Collects cycle answers (rows whose question text names the cycle) per
/// group, dropping placeholder tokens and stripping the spreadsheet's
/// trailing ".0", then gap-fills assuming a respondent's cycle is constant
/// across the submission.
fn harvest_cycle_answers(
    table: &Table,
    groups: &[usize],
    question_col: usize,
    answer_col: usize,
    vocab: &Vocabulary,
) -> BTreeMap<usize, String> {
    let mut out = BTreeMap::new();
    for idx in 0..table.len() {
        let Some(question) = table.cell(idx, question_col) else {
            continue;
        };
        if !roles::text_matches_role(question, Role::Cycle, vocab) {
            continue;
        }
        let Some(answer) = table.cell(idx, answer_col) else {
            continue;
        };
        let cleaned = clean_cycle_value(answer);
        if cleaned.is_empty()
            || vocab
                .placeholder_tokens
                .iter()
                .any(|t| t == &text::normalize(&cleaned))
        {
            continue;
        }
        out.entry(groups[idx]).or_insert(cleaned);
    }
    out
}

/// First present value of one column per group.
fn harvest_first_values(table: &Table, groups: &[usize], col: usize) -> BTreeMap<usize, String> {
    let mut out = BTreeMap::new();
    for idx in 0..table.len() {
        if let Some(value) = table.cell(idx, col) {
            out.entry(groups[idx]).or_insert_with(|| value.to_string());
        }
    }
    out
}

/// Strips the float artifact spreadsheets add to numeric cycle answers.
pub fn clean_cycle_value(value: &str) -> String {
    let trimmed = value.trim();
    trimmed
        .strip_suffix(".0")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

struct WideData {
    questions: Vec<String>,
    cells: BTreeMap<(usize, usize), String>,
    group_ids: Vec<usize>,
}

type ReshapeFn = fn(&[LongEntry], usize) -> Result<WideData, ReshapeError>;

fn distinct_questions(entries: &[LongEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.question.clone())
        .unique()
        .collect()
}

fn present_groups(entries: &[LongEntry]) -> Vec<usize> {
    entries.iter().map(|e| e.group).sorted().dedup().collect()
}

/// Strict reshape: refuses duplicate (group, question) pairs.
fn reshape_strict(entries: &[LongEntry], _group_count: usize) -> Result<WideData, ReshapeError> {
    if entries.is_empty() {
        return Err(ReshapeError::Degenerate);
    }
    let questions = distinct_questions(entries);
    let mut cells = BTreeMap::new();
    for entry in entries {
        let q_idx = questions
            .iter()
            .position(|q| *q == entry.question)
            .expect("question present in distinct list");
        if cells
            .insert((entry.group, q_idx), entry.answer.clone())
            .is_some()
        {
            return Err(ReshapeError::DuplicateCell {
                group: entry.group,
                question: entry.question.clone(),
            });
        }
    }
    Ok(WideData {
        questions,
        cells,
        group_ids: present_groups(entries),
    })
}

/// Duplicate-tolerant reshape: keeps the first answer per (group, question).
fn reshape_first_wins(entries: &[LongEntry], _group_count: usize) -> Result<WideData, ReshapeError> {
    if entries.is_empty() {
        return Err(ReshapeError::Degenerate);
    }
    let questions = distinct_questions(entries);
    let mut cells: BTreeMap<(usize, usize), String> = BTreeMap::new();
    for entry in entries {
        let q_idx = questions
            .iter()
            .position(|q| *q == entry.question)
            .expect("question present in distinct list");
        cells
            .entry((entry.group, q_idx))
            .or_insert_with(|| entry.answer.clone());
    }
    Ok(WideData {
        questions,
        cells,
        group_ids: present_groups(entries),
    })
}

/// Last-ditch aggregation: group rows first, then take the first answer seen
/// for each question inside the group.
fn reshape_group_first(entries: &[LongEntry], group_count: usize) -> Result<WideData, ReshapeError> {
    if entries.is_empty() {
        return Err(ReshapeError::Degenerate);
    }
    let questions = distinct_questions(entries);
    let mut cells: BTreeMap<(usize, usize), String> = BTreeMap::new();
    for group in 0..group_count {
        for entry in entries.iter().filter(|e| e.group == group) {
            let q_idx = questions
                .iter()
                .position(|q| *q == entry.question)
                .expect("question present in distinct list");
            cells
                .entry((group, q_idx))
                .or_insert_with(|| entry.answer.clone());
        }
    }
    Ok(WideData {
        questions,
        cells,
        group_ids: present_groups(entries),
    })
}

/// Builds the output table: one row per group in ascending id order, one
/// column per question, plus the harvested cycle and survey-name columns
/// gap-filled forward then backward. A side column whose name already exists
/// among the pivoted questions (a literal "CICLO" question) overwrites that
/// column instead of duplicating it.
fn attach_side_columns(
    wide: WideData,
    cycle_by_group: &BTreeMap<usize, String>,
    survey_by_group: &BTreeMap<usize, String>,
    survey_column_name: Option<String>,
    vocab: &Vocabulary,
) -> Table {
    let mut columns = wide.questions.clone();
    let cycle_slot = (!cycle_by_group.is_empty())
        .then(|| reserve_column(&mut columns, &vocab.cycle_column));
    let survey_slot = survey_column_name
        .filter(|_| !survey_by_group.is_empty())
        .map(|name| reserve_column(&mut columns, &name));

    let cycle_filled = fill_gaps(&wide.group_ids, cycle_by_group);
    let survey_filled = fill_gaps(&wide.group_ids, survey_by_group);

    let mut table = Table::new(columns.clone());
    for (row_idx, group) in wide.group_ids.iter().enumerate() {
        let mut row: Vec<String> = (0..columns.len())
            .map(|q_idx| {
                if q_idx >= wide.questions.len() {
                    return String::new();
                }
                wide.cells
                    .get(&(*group, q_idx))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();
        if let Some(slot) = cycle_slot {
            row[slot] = cycle_filled.get(row_idx).cloned().unwrap_or_default();
        }
        if let Some(slot) = survey_slot {
            row[slot] = survey_filled.get(row_idx).cloned().unwrap_or_default();
        }
        table.push_row(row);
    }
    table
}

/// Index of `name` in the column list, appending it when absent.
fn reserve_column(columns: &mut Vec<String>, name: &str) -> usize {
    match columns.iter().position(|c| c == name) {
        Some(idx) => idx,
        None => {
            columns.push(name.to_string());
            columns.len() - 1
        }
    }
}

/// Forward-fill then backward-fill over groups in ascending id order.
fn fill_gaps(group_ids: &[usize], values: &BTreeMap<usize, String>) -> Vec<String> {
    let mut out: Vec<String> = group_ids
        .iter()
        .map(|g| values.get(g).cloned().unwrap_or_default())
        .collect();
    let mut last = String::new();
    for slot in out.iter_mut() {
        if slot.is_empty() {
            *slot = last.clone();
        } else {
            last = slot.clone();
        }
    }
    let mut next = String::new();
    for slot in out.iter_mut().rev() {
        if slot.is_empty() {
            *slot = next.clone();
        } else {
            next = slot.clone();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_table(rows: &[(&str, &str, &str, &str)]) -> Table {
        // (survey, respondent, question, answer)
        Table::from_rows(
            vec![
                "Pesquisa".into(),
                "Usuário".into(),
                "Pergunta".into(),
                "Nome exibido".into(),
            ],
            rows.iter()
                .map(|(s, u, q, a)| {
                    vec![s.to_string(), u.to_string(), q.to_string(), a.to_string()]
                })
                .collect(),
        )
    }

    #[test]
    fn wide_input_passes_through_unchanged() {
        let vocab = Vocabulary::default();
        let wide = Table::from_rows(
            vec!["Nota".into(), "Comentário".into()],
            vec![vec!["5".into(), "ok".into()]],
        );
        assert_eq!(pivot(&wide, &vocab), wide);
    }

    #[test]
    fn pivot_produces_one_row_per_submission() {
        let vocab = Vocabulary::default();
        let table = long_table(&[
            ("1 CICLO - Avaliação MCOM", "u1", "Qual sua nota?", "5"),
            ("1 CICLO - Avaliação MCOM", "u1", "Indicaria o curso?", "Sim"),
            ("1 CICLO - Avaliação MCOM", "u2", "Qual sua nota?", "4"),
            ("1 CICLO - Avaliação MCOM", "u2", "Indicaria o curso?", "Não"),
        ]);
        let wide = pivot(&table, &vocab);
        assert_eq!(wide.len(), 2);
        let nota = wide.column_index("Qual sua nota?").expect("nota column");
        let indicaria = wide
            .column_index("Indicaria o curso?")
            .expect("indicaria column");
        assert_eq!(wide.cell(0, nota), Some("5"));
        assert_eq!(wide.cell(1, nota), Some("4"));
        assert_eq!(wide.cell(0, indicaria), Some("Sim"));
        assert_eq!(wide.cell(1, indicaria), Some("Não"));
    }

    #[test]
    fn cycle_answers_become_a_column_with_gap_fill() {
        let vocab = Vocabulary::default();
        let table = long_table(&[
            ("Avaliação MCOM", "u1", "CICLO", "2.0"),
            ("Avaliação MCOM", "u1", "Qual sua nota?", "5"),
            ("Avaliação MCOM", "u2", "Qual sua nota?", "3"),
        ]);
        // u2 never answered the cycle question; backward/forward fill covers it.
        let wide = pivot(&table, &vocab);
        let ciclo = wide.column_index("CICLO").expect("cycle column");
        assert_eq!(wide.cell(0, ciclo), Some("2"));
        assert_eq!(wide.cell(1, ciclo), Some("2"));
    }

    #[test]
    fn survey_name_survives_the_reshape() {
        let vocab = Vocabulary::default();
        let table = long_table(&[
            ("2 CICLO - Avaliação MCOM", "u1", "Qual sua nota?", "5"),
            ("2 CICLO - Avaliação MCOM", "u1", "Indicaria?", "Sim"),
        ]);
        let wide = pivot(&table, &vocab);
        let survey = wide.column_index("Pesquisa").expect("survey column");
        assert_eq!(wide.cell(0, survey), Some("2 CICLO - Avaliação MCOM"));
    }

    #[test]
    fn duplicate_answers_fall_back_to_first_wins() {
        let vocab = Vocabulary::default();
        let table = long_table(&[
            ("P", "u1", "Qual sua nota?", "5"),
            ("P", "u1", "Comentário", "bom"),
            ("P", "u1", "Comentário", "ótimo"),
        ]);
        let wide = pivot(&table, &vocab);
        assert_eq!(wide.len(), 1);
        let comment = wide.column_index("Comentário").expect("comment column");
        assert_eq!(wide.cell(0, comment), Some("bom"));
    }

    #[test]
    fn interleaved_respondents_do_not_share_groups() {
        let vocab = Vocabulary::default();
        let table = long_table(&[
            ("P", "u1", "Qual sua nota?", "5"),
            ("P", "u2", "Qual sua nota?", "1"),
            ("P", "u1", "Indicaria?", "Sim"),
            ("P", "u2", "Indicaria?", "Não"),
        ]);
        let wide = pivot(&table, &vocab);
        assert_eq!(wide.len(), 2);
        let nota = wide.column_index("Qual sua nota?").expect("nota");
        let indicaria = wide.column_index("Indicaria?").expect("indicaria");
        assert_eq!(wide.cell(0, nota), Some("5"));
        assert_eq!(wide.cell(0, indicaria), Some("Sim"));
        assert_eq!(wide.cell(1, nota), Some("1"));
        assert_eq!(wide.cell(1, indicaria), Some("Não"));
    }

    #[test]
    fn degenerate_long_table_returns_input() {
        let vocab = Vocabulary::default();
        // Question column resolves but every answer cell is missing.
        let table = long_table(&[("P", "u1", "Qual sua nota?", ""), ("P", "u1", "Outra?", "")]);
        let wide = pivot(&table, &vocab);
        assert_eq!(wide, table);
    }
}
