mod common;

use chrono::NaiveDate;
use proptest::prelude::*;

use cohort_lens::engine::Engine;
use cohort_lens::filters::{self, FilterSelection, Selection};
use cohort_lens::metrics;
use cohort_lens::vocab::{Role, Vocabulary};

use common::fixture_datasets;

fn engine() -> Engine {
    Engine::new(fixture_datasets(), Vocabulary::default())
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 5).expect("fixed date")
}

fn selection(
    cycle: Option<&str>,
    local: Option<&str>,
    status: Option<&str>,
    gender: Option<&str>,
) -> FilterSelection {
    FilterSelection {
        cycle: cycle.map(str::to_string).into(),
        location: local.map(str::to_string).into(),
        status: status.map(str::to_string).into(),
        gender: gender.map(str::to_string).into(),
    }
}

#[test]
fn status_filter_propagates_to_enrollments_by_shared_email() {
    let engine = engine();
    let view = engine.select(&selection(None, None, Some("CURSANDO"), None), today());
    // "CURSANDO" plus the compound "Cursando - atestado" row.
    assert_eq!(view.students.len(), 2);
    assert_eq!(view.enrollments.len(), 2);
    let email_col = view
        .enrollments
        .column_index("Endereço de e-mail")
        .expect("email column");
    let mut emails: Vec<&str> = view.enrollments.column_values(email_col).collect();
    emails.sort();
    assert_eq!(emails, vec!["ana@exemplo.com", "carla@exemplo.com"]);
}

#[test]
fn cycle_filter_narrows_all_three_tables() {
    let engine = engine();
    let view = engine.select(&selection(Some("2"), None, None, None), today());
    assert_eq!(view.students.len(), 2); // Bruno, Davi
    assert_eq!(view.enrollments.len(), 2);
    // Only Bruno submitted an evaluation in cycle 2.
    assert_eq!(view.evaluations.len(), 1);
    let email_col = view
        .evaluations
        .column_index("Qual o seu e-mail?")
        .expect("email question column");
    assert_eq!(view.evaluations.cell(0, email_col), Some("bruno@exemplo.com"));
}

#[test]
fn unmatched_cycle_with_no_other_filter_keeps_all_evaluations() {
    let engine = engine();
    let view = engine.select(&selection(Some("9"), None, None, None), today());
    // No evaluation row extracts to cycle 9; the filter degrades to a no-op
    // rather than returning an empty table.
    assert_eq!(view.evaluations.len(), engine.evaluations().len());
    assert_eq!(view.students.len(), 0);
}

#[test]
fn location_filter_uses_region_vocabulary_for_enrollments() {
    let engine = engine();
    let view = engine.select(&selection(None, Some("Ceilândia - EQNM"), None, None), today());
    assert_eq!(view.students.len(), 2);
    assert_eq!(view.enrollments.len(), 2);
}

#[test]
fn status_tally_conserves_totals_under_every_selection() {
    let engine = engine();
    let selections = [
        selection(None, None, None, None),
        selection(Some("1"), None, None, None),
        selection(None, Some("Gama"), None, None),
        selection(None, None, Some("CURSANDO + CONCLUÍDO"), None),
        selection(None, None, None, Some("Feminino")),
        selection(Some("2"), Some("Planaltina"), Some("DESISTENTE"), Some("Masculino")),
    ];
    for sel in selections {
        let view = engine.select(&sel, today());
        let total: usize = view.status_tally.iter().map(|row| row.count).sum();
        assert_eq!(total, view.students.len(), "selection: {sel:?}");
    }
}

#[test]
fn income_distribution_groups_bracket_synonyms() {
    let engine = engine();
    let view = engine.select(&FilterSelection::default(), today());
    let income = view.income.expect("income distribution");
    let two_to_three = income
        .iter()
        .find(|row| row.label == "De 2 a 3 salários mínimos")
        .expect("2-3 bracket");
    // "2-3 salarios" and "dois a tres salarios" fold into the same bracket.
    assert_eq!(two_to_three.count, 2);
    let labels: Vec<&str> = income.iter().map(|row| row.label.as_str()).collect();
    let no_income = labels.iter().position(|l| *l == "Não possui renda mensal");
    let until_one = labels.iter().position(|l| *l == "Até um salário mínimo");
    assert!(no_income < until_one, "brackets must be ordered low to high");
}

#[test]
fn age_buckets_come_from_birthdates_with_fixed_edges() {
    let engine = engine();
    let view = engine.select(&FilterSelection::default(), today());
    let buckets = view.age_buckets.expect("age buckets");
    let get = |label: &str| {
        buckets
            .iter()
            .find(|row| row.label == label)
            .map(|row| row.count)
            .unwrap_or(0)
    };
    assert_eq!(get("19-25"), 2); // Ana (25), Carla (22)
    assert_eq!(get("26-30"), 1); // Bruno (27)
    assert_eq!(get("31-35"), 1); // Davi (31)
    // Eva has no birthdate: dropped row-wise, and empty buckets are omitted.
    let total: usize = buckets.iter().map(|row| row.count).sum();
    assert_eq!(total, 4);
}

#[test]
fn gender_counts_follow_the_filtered_enrollments() {
    let engine = engine();
    let view = engine.select(&selection(None, None, None, Some("Feminino")), today());
    let gender = metrics::role_value_counts(&view.enrollments, Role::Gender, engine.vocab())
        .expect("gender counts");
    assert_eq!(gender.len(), 1);
    assert_eq!(gender[0].label, "Feminino");
    assert_eq!(gender[0].count, 3);
}

#[test]
fn applying_the_same_selection_twice_is_a_fixed_point() {
    let engine = engine();
    let vocab = engine.vocab();
    let sel = selection(Some("1"), None, Some("CURSANDO"), Some("Feminino"));
    let (students_once, enrollments_once) =
        filters::apply_filters(engine.students(), engine.enrollments(), &sel, vocab);
    let (students_twice, enrollments_twice) =
        filters::apply_filters(&students_once, &enrollments_once, &sel, vocab);
    assert_eq!(students_once, students_twice);
    assert_eq!(enrollments_once, enrollments_twice);
}

proptest! {
    #[test]
    fn apply_filters_is_idempotent_for_arbitrary_selections(
        cycle in prop_oneof![Just(None), Just(Some("1")), Just(Some("2")), Just(Some("9"))],
        local in prop_oneof![
            Just(None),
            Just(Some("Gama")),
            Just(Some("Ceilândia - EQNM")),
            Just(Some("Planaltina")),
        ],
        status in prop_oneof![
            Just(None),
            Just(Some("CURSANDO")),
            Just(Some("CONCLUÍDO")),
            Just(Some("DESISTENTE")),
            Just(Some("CURSANDO + CONCLUÍDO")),
        ],
        gender in prop_oneof![Just(None), Just(Some("Feminino")), Just(Some("Masculino"))],
    ) {
        let engine = engine();
        let vocab = engine.vocab();
        let sel = FilterSelection {
            cycle: cycle.map(str::to_string).into(),
            location: local.map(str::to_string).into(),
            status: status.map(str::to_string).into(),
            gender: gender.map(str::to_string).into(),
        };
        let (s1, e1) = filters::apply_filters(engine.students(), engine.enrollments(), &sel, vocab);
        let (s2, e2) = filters::apply_filters(&s1, &e1, &sel, vocab);
        prop_assert_eq!(&s1, &s2);
        prop_assert_eq!(&e1, &e2);
        prop_assert!(s1.len() <= engine.students().len());
    }
}

#[test]
fn selection_parsing_treats_blank_as_all() {
    assert_eq!(Selection::from(None), Selection::All);
    assert_eq!(Selection::from(Some("  ".to_string())), Selection::All);
    assert_eq!(
        Selection::from(Some("2".to_string())),
        Selection::Value("2".to_string())
    );
}
