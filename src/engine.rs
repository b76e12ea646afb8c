//! Orchestration: preprocessed original snapshots plus the full
//! recompute-per-selection pass.
//!
//! [`Engine::new`] runs the one-time preprocessing (normalized-status column
//! on students, long-to-wide pivot on evaluations) and holds the results as
//! immutable originals. Every call to [`Engine::select`] re-derives filtered
//! snapshots and categorical summaries from those originals — there is no
//! incremental path, which is what makes repeated selections reproducible.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;
use serde::Serialize;

use crate::{
    category::{self, Category},
    cli::SummaryArgs,
    dataset::{Datasets, Table},
    filters::{self, FilterSelection},
    io_utils,
    metrics::{self, CategoryCount},
    pivot, roles, table,
    vocab::{Role, Vocabulary},
};

pub struct Engine {
    vocab: Vocabulary,
    students: Table,
    enrollments: Table,
    evaluations: Table,
}

/// Resolved role → column mapping per table, so a rendering client can
/// decide up front which views are drawable.
#[derive(Debug, Clone, Serialize)]
pub struct RoleReport {
    pub enrollments: BTreeMap<String, Option<String>>,
    pub evaluations: BTreeMap<String, Option<String>>,
    pub students: BTreeMap<String, Option<String>>,
}

/// Output of one recompute pass.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredView {
    pub students: Table,
    pub enrollments: Table,
    pub evaluations: Table,
    pub roles: RoleReport,
    pub status_tally: Vec<CategoryCount>,
    pub income: Option<Vec<CategoryCount>>,
    pub age_buckets: Option<Vec<CategoryCount>>,
}

impl Engine {
    pub fn new(datasets: Datasets, vocab: Vocabulary) -> Self {
        let students = prepare_students(&datasets.students, &vocab);
        let evaluations = pivot::pivot(&datasets.evaluations, &vocab);
        Engine {
            vocab,
            students,
            enrollments: datasets.enrollments,
            evaluations,
        }
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn students(&self) -> &Table {
        &self.students
    }

    pub fn enrollments(&self) -> &Table {
        &self.enrollments
    }

    pub fn evaluations(&self) -> &Table {
        &self.evaluations
    }

    /// Runs one full pass over the originals for the given selection.
    /// `today` anchors age computation so results stay reproducible.
    pub fn select(&self, selection: &FilterSelection, today: NaiveDate) -> FilteredView {
        let (students_f, enrollments_f) =
            filters::apply_filters(&self.students, &self.enrollments, selection, &self.vocab);
        let evaluations_f = filters::filter_evaluations(
            &self.evaluations,
            &students_f,
            &enrollments_f,
            &self.students,
            &self.enrollments,
            selection,
            &self.vocab,
        );
        FilteredView {
            roles: RoleReport {
                enrollments: role_map(&self.enrollments, &self.vocab),
                evaluations: role_map(&self.evaluations, &self.vocab),
                students: role_map(&self.students, &self.vocab),
            },
            status_tally: metrics::status_tally(&students_f, &self.vocab),
            income: metrics::income_distribution(&students_f, &self.vocab),
            age_buckets: metrics::age_buckets(&students_f, today, &self.vocab),
            students: students_f,
            enrollments: enrollments_f,
            evaluations: evaluations_f,
        }
    }

    /// Distinct observed values for one role's column in the given original
    /// snapshot — the value domain a selector UI offers.
    pub fn selector_options(&self, snapshot: &Table, role: Role) -> Vec<String> {
        let Some(col) = roles::resolve_index(snapshot.columns(), role, &self.vocab) else {
            return Vec::new();
        };
        let mut values: Vec<String> = snapshot
            .column_values(col)
            .map(str::to_string)
            .collect();
        values.sort();
        values.dedup();
        values
    }
}

/// Role → column-name map for one table.
pub fn role_map(table: &Table, vocab: &Vocabulary) -> BTreeMap<String, Option<String>> {
    Role::ALL
        .iter()
        .map(|role| {
            (
                role.label().to_string(),
                roles::resolve(table.columns(), *role, vocab).map(str::to_string),
            )
        })
        .collect()
}

/// Appends the canonical-status column when a raw status column resolves.
/// Rows with missing or placeholder status carry the missing-status label so
/// later tallies and filters see a total column.
fn prepare_students(students: &Table, vocab: &Vocabulary) -> Table {
    if students.column_index(&vocab.normalized_status_column).is_some() {
        return students.clone();
    }
    let Some(col) = roles::resolve_index(students.columns(), Role::Status, vocab) else {
        return students.clone();
    };
    let values: Vec<String> = (0..students.len())
        .map(|idx| {
            category::normalize_status(students.cell(idx, col), vocab)
                .map(Category::into_label)
                .unwrap_or_else(|| vocab.missing_status_label.clone())
        })
        .collect();
    students.with_column(&vocab.normalized_status_column, values)
}

#[derive(Debug, Serialize)]
struct SummaryTotals {
    enrollments: usize,
    students: usize,
    evaluations: usize,
    completed: usize,
    active: usize,
    dropped_out: usize,
    dropout_rate_percent: f64,
}

#[derive(Debug, Serialize)]
struct SummaryReport {
    selection: FilterSelection,
    totals: SummaryTotals,
    roles: RoleReport,
    status_tally: Vec<CategoryCount>,
    income: Option<Vec<CategoryCount>>,
    age_buckets: Option<Vec<CategoryCount>>,
    gender: Option<Vec<CategoryCount>>,
    race: Option<Vec<CategoryCount>>,
    local: Option<Vec<CategoryCount>>,
}

/// `summary` subcommand: load, filter, derive, print.
pub fn execute(args: &SummaryArgs) -> Result<()> {
    let vocab = Vocabulary::load_or_default(args.inputs.vocab.as_deref())?;
    let datasets = load_datasets(args)?;
    let engine = Engine::new(datasets, vocab);

    let selection = FilterSelection {
        cycle: args.cycle.clone().into(),
        location: args.local.clone().into(),
        status: args.status.clone().into(),
        gender: args.gender.clone().into(),
    };
    let today = chrono::Local::now().date_naive();
    let view = engine.select(&selection, today);
    info!(
        "selection applied: {} student(s), {} enrollment(s), {} evaluation(s)",
        view.students.len(),
        view.enrollments.len(),
        view.evaluations.len()
    );

    let tally_count = |label: &str| {
        view.status_tally
            .iter()
            .find(|row| row.label == label)
            .map(|row| row.count)
            .unwrap_or(0)
    };
    let dropped_out = tally_count("DESISTENTE");
    let totals = SummaryTotals {
        enrollments: view.enrollments.len(),
        students: view.students.len(),
        evaluations: view.evaluations.len(),
        completed: tally_count("CONCLUÍDO"),
        active: tally_count("CURSANDO"),
        dropped_out,
        dropout_rate_percent: if view.students.is_empty() {
            0.0
        } else {
            dropped_out as f64 / view.students.len() as f64 * 100.0
        },
    };

    let gender = metrics::role_value_counts(&view.enrollments, Role::Gender, engine.vocab());
    let race = metrics::role_value_counts(&view.students, Role::Race, engine.vocab());
    let local = metrics::role_value_counts(&view.students, Role::Local, engine.vocab());

    if args.json {
        let report = SummaryReport {
            selection,
            totals,
            roles: view.roles,
            status_tally: view.status_tally,
            income: view.income,
            age_buckets: view.age_buckets,
            gender,
            race,
            local,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Serializing summary")?
        );
        return Ok(());
    }

    print_totals(&totals);
    print_counts("Status", Some(view.status_tally.as_slice()));
    print_counts("Renda familiar", view.income.as_deref());
    print_counts("Faixa etária", view.age_buckets.as_deref());
    print_counts("Gênero", gender.as_deref());
    print_counts("Raça/Cor", race.as_deref());
    print_counts("Local", local.as_deref());
    Ok(())
}

fn load_datasets(args: &SummaryArgs) -> Result<Datasets> {
    let load = |path: &std::path::Path, label: &str| {
        io_utils::load_table(
            path,
            args.inputs.delimiter,
            args.inputs.input_encoding.as_deref(),
        )
        .with_context(|| format!("Loading {label} table"))
    };
    Ok(Datasets {
        enrollments: load(&args.inputs.enrollments, "enrollments")?,
        evaluations: load(&args.inputs.evaluations, "evaluations")?,
        students: load(&args.inputs.students, "students")?,
    })
}

fn print_totals(totals: &SummaryTotals) {
    let headers = vec!["metric".to_string(), "value".to_string()];
    let rows = vec![
        vec!["enrollments".to_string(), totals.enrollments.to_string()],
        vec!["students".to_string(), totals.students.to_string()],
        vec!["evaluations".to_string(), totals.evaluations.to_string()],
        vec!["completed".to_string(), totals.completed.to_string()],
        vec!["active".to_string(), totals.active.to_string()],
        vec!["dropped out".to_string(), totals.dropped_out.to_string()],
        vec![
            "dropout rate".to_string(),
            format!("{:.1}%", totals.dropout_rate_percent),
        ],
    ];
    table::print_table(&headers, &rows);
    println!();
}

fn print_counts(title: &str, counts: Option<&[CategoryCount]>) {
    match counts {
        Some(rows) if !rows.is_empty() => {
            println!("{title}:");
            let headers = vec!["value".to_string(), "count".to_string()];
            let body: Vec<Vec<String>> = rows
                .iter()
                .map(|row| vec![row.label.clone(), row.count.to_string()])
                .collect();
            table::print_table(&headers, &body);
            println!();
        }
        _ => println!("{title}: not available\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Selection;

    fn datasets() -> Datasets {
        Datasets {
            students: Table::from_rows(
                vec![
                    "NOME".into(),
                    "E-MAIL".into(),
                    "STATUS".into(),
                    "LOCAL".into(),
                ],
                vec![
                    vec![
                        "Ana".into(),
                        "ana@x.com".into(),
                        "cursando".into(),
                        "Gama".into(),
                    ],
                    vec![
                        "Bia".into(),
                        "bia@x.com".into(),
                        "desistiu".into(),
                        "Gama".into(),
                    ],
                ],
            ),
            enrollments: Table::from_rows(
                vec!["Endereço de e-mail".into(), "Sexo:".into()],
                vec![
                    vec!["ana@x.com".into(), "Feminino".into()],
                    vec!["bia@x.com".into(), "Feminino".into()],
                ],
            ),
            evaluations: Table::from_rows(
                vec![
                    "Pesquisa".into(),
                    "Pergunta".into(),
                    "Nome exibido".into(),
                ],
                vec![
                    vec![
                        "2 CICLO - Avaliação MCOM".into(),
                        "Qual sua nota?".into(),
                        "5".into(),
                    ],
                    vec![
                        "2 CICLO - Avaliação MCOM".into(),
                        "Indicaria?".into(),
                        "Sim".into(),
                    ],
                ],
            ),
        }
    }

    #[test]
    fn engine_preprocesses_status_and_pivots_evaluations() {
        let engine = Engine::new(datasets(), Vocabulary::default());
        assert!(
            engine
                .students()
                .column_index("STATUS_NORMALIZADO")
                .is_some()
        );
        // Long table became one row per submission.
        assert_eq!(engine.evaluations().len(), 1);
        assert!(engine.evaluations().column_index("Pesquisa").is_some());
    }

    #[test]
    fn select_is_reproducible_for_the_same_selection() {
        let engine = Engine::new(datasets(), Vocabulary::default());
        let selection = FilterSelection {
            status: Selection::Value("CURSANDO".into()),
            ..FilterSelection::default()
        };
        let today = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let first = engine.select(&selection, today);
        let second = engine.select(&selection, today);
        assert_eq!(first.students, second.students);
        assert_eq!(first.enrollments, second.enrollments);
        assert_eq!(first.evaluations, second.evaluations);
        assert_eq!(first.status_tally, second.status_tally);
    }

    #[test]
    fn selector_options_list_distinct_observed_values() {
        let engine = Engine::new(datasets(), Vocabulary::default());
        let options = engine.selector_options(engine.students(), Role::Local);
        assert_eq!(options, vec!["Gama".to_string()]);
    }

    #[test]
    fn role_report_marks_unavailable_roles() {
        let engine = Engine::new(datasets(), Vocabulary::default());
        let report = role_map(engine.students(), engine.vocab());
        assert_eq!(report.get("birthdate"), Some(&None));
        assert_eq!(
            report.get("status"),
            Some(&Some("STATUS".to_string()))
        );
    }
}
