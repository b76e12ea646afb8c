//! Vocabulary: the keyword and category rule tables driving reconciliation.
//!
//! Every heuristic in the crate (column resolution, category bucketing,
//! region matching, soft-key discovery, cycle extraction) reads its match
//! vocabulary from this one structure instead of hard-coded literals. The
//! [`Default`] vocabulary reproduces the conventions of the source
//! organization's spreadsheets (Brazilian-Portuguese headers, Distrito
//! Federal region names); deployments with different sheets override it with
//! a YAML file via `--vocab`.
//!
//! All keyword entries are written in normalized form (lowercase, no
//! accents) because matching happens on [`crate::text::normalize`]d input.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Semantic purpose a physical column may serve, resolved per table at
/// runtime. A role may be absent from a table; absence is not an error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Status,
    Income,
    Local,
    Region,
    Birthdate,
    Age,
    Gender,
    Race,
    Course,
    Cycle,
    Question,
    FreeTextAnswer,
    DisplayName,
    Respondent,
    Survey,
    CourseRating,
    InstructorRating,
    Channel,
}

impl Role {
    pub const ALL: &'static [Role] = &[
        Role::Status,
        Role::Income,
        Role::Local,
        Role::Region,
        Role::Birthdate,
        Role::Age,
        Role::Gender,
        Role::Race,
        Role::Course,
        Role::Cycle,
        Role::Question,
        Role::FreeTextAnswer,
        Role::DisplayName,
        Role::Respondent,
        Role::Survey,
        Role::CourseRating,
        Role::InstructorRating,
        Role::Channel,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Role::Status => "status",
            Role::Income => "income",
            Role::Local => "local",
            Role::Region => "region",
            Role::Birthdate => "birthdate",
            Role::Age => "age",
            Role::Gender => "gender",
            Role::Race => "race",
            Role::Course => "course",
            Role::Cycle => "cycle",
            Role::Question => "question",
            Role::FreeTextAnswer => "free_text_answer",
            Role::DisplayName => "display_name",
            Role::Respondent => "respondent",
            Role::Survey => "survey",
            Role::CourseRating => "course_rating",
            Role::InstructorRating => "instructor_rating",
            Role::Channel => "channel",
        }
    }
}

/// One acceptance group for a role: a conjunction of alternative sets. A
/// normalized column name satisfies the group when every inner set has at
/// least one member appearing as a substring. Groups are tried in order, so
/// composite requirements ("rating" word AND "course" word) rank above
/// weaker single-keyword fallbacks.
pub type KeywordGroup = Vec<Vec<String>>;

/// Ordered substring rule mapping raw categorical text onto one canonical
/// label. `any` must have a hit, every `all` entry must be present, no
/// `none` entry may be present. `span` marks numeric brackets ("N to M
/// wages", open-ended when the upper bound is absent) used by the
/// digit-group fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub label: String,
    #[serde(default)]
    pub any: Vec<String>,
    #[serde(default)]
    pub all: Vec<String>,
    #[serde(default)]
    pub none: Vec<String>,
    #[serde(default)]
    pub span: Option<(u64, Option<u64>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Keyword groups per role, most specific first.
    pub roles: BTreeMap<Role, Vec<KeywordGroup>>,
    /// Status bucket rules, most specific first.
    pub status_rules: Vec<CategoryRule>,
    /// Income bracket rules in canonical low-to-high order.
    pub income_rules: Vec<CategoryRule>,
    /// Standalone words stripped before income pattern matching.
    pub income_fillers: Vec<String>,
    /// Word whose presence marks a wage-bracket answer.
    pub wage_marker: String,
    /// Known region names, matched as substrings of location values.
    pub regions: Vec<String>,
    /// Column-name keywords that identify a person across tables.
    pub link_keys: Vec<String>,
    /// Column-name keywords locating a respondent id in evaluations.
    pub respondent_keys: Vec<String>,
    /// Survey-name markers identifying a program evaluation (cycle "1" when
    /// no explicit cycle number is present).
    pub program_markers: Vec<String>,
    /// Word marking an evaluation survey name.
    pub evaluation_marker: String,
    /// Normalized cell values treated as missing data.
    pub placeholder_tokens: Vec<String>,
    /// Label assigned to rows whose status cell is missing or placeholder.
    pub missing_status_label: String,
    /// Synthetic tally row absorbing rows lost to grouping anomalies.
    pub residual_label: String,
    /// Name of the derived column holding canonical status labels.
    pub normalized_status_column: String,
    /// Name of the column the pivot engine attaches harvested cycle answers
    /// to.
    pub cycle_column: String,
}

impl Vocabulary {
    /// Loads a vocabulary override from YAML. Fields omitted from the file
    /// keep their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening vocabulary file {path:?}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).context("Parsing vocabulary YAML")
    }

    /// Override file when given, built-in defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn role_groups(&self, role: Role) -> &[KeywordGroup] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary {
            roles: default_roles(),
            status_rules: default_status_rules(),
            income_rules: default_income_rules(),
            income_fillers: strings(&["de", "recebe"]),
            wage_marker: "salario".to_string(),
            regions: strings(&[
                "planaltina",
                "gama",
                "ceilandia",
                "taguatinga",
                "samambaia",
                "brazlandia",
                "sobradinho",
                "guara",
                "cruzeiro",
                "sudoeste",
                "asa norte",
                "asa sul",
                "lago norte",
                "lago sul",
                "aguas claras",
                "riacho fundo",
                "santa maria",
                "recanto das emas",
                "candangolandia",
            ]),
            link_keys: strings(&[
                "email", "nome", "cpf", "telefone", "celular", "whatsapp",
            ]),
            respondent_keys: strings(&["usuario", "opiniao", "pesquisa", "email", "nome"]),
            program_markers: strings(&["mcom", "mkt digital"]),
            evaluation_marker: "avaliacao".to_string(),
            placeholder_tokens: strings(&["", "nan", "none", "null", "n/a", "na", "ignorados"]),
            missing_status_label: "SEM STATUS".to_string(),
            residual_label: "OUTROS/NÃO CLASSIFICADOS".to_string(),
            normalized_status_column: "STATUS_NORMALIZADO".to_string(),
            cycle_column: "CICLO".to_string(),
        }
    }
}

fn default_roles() -> BTreeMap<Role, Vec<KeywordGroup>> {
    let mut roles = BTreeMap::new();
    roles.insert(Role::Status, simple_groups(&["status"]));
    roles.insert(Role::Income, simple_groups(&["renda", "salario", "familiar"]));
    roles.insert(Role::Local, simple_groups(&["local"]));
    roles.insert(
        Role::Region,
        simple_groups(&["regiao", "local", "cidade", "endereco", "bairro"]),
    );
    roles.insert(
        Role::Birthdate,
        simple_groups(&["data de nascimento", "nascimento", "nasc", "birth"]),
    );
    roles.insert(Role::Age, simple_groups(&["idade", "age"]));
    roles.insert(Role::Gender, simple_groups(&["sexo", "genero"]));
    roles.insert(
        Role::Race,
        simple_groups(&["ibge", "raca", "cor", "autodeclara"]),
    );
    roles.insert(Role::Course, simple_groups(&["curso"]));
    roles.insert(Role::Cycle, simple_groups(&["ciclo"]));
    roles.insert(Role::Question, simple_groups(&["pergunta", "question"]));
    roles.insert(
        Role::FreeTextAnswer,
        simple_groups(&["resposta de texto livre", "resposta"]),
    );
    roles.insert(Role::DisplayName, simple_groups(&["nome exibido"]));
    roles.insert(
        Role::Respondent,
        simple_groups(&["usuario", "opiniao", "pesquisa"]),
    );
    roles.insert(Role::Survey, simple_groups(&["pesquisa"]));
    roles.insert(
        Role::CourseRating,
        vec![composite(
            &["considerei", "considerou", "avaliacao", "avaliar", "avaliou"],
            &["curso", "meta", "metalab"],
        )],
    );
    roles.insert(
        Role::InstructorRating,
        vec![composite(
            &["avalie", "avaliar", "avaliou", "avaliacao"],
            &["professor", "educador", "instrutor", "docente"],
        )],
    );
    roles.insert(Role::Channel, vec![composite(&["sabendo"], &["curso"])]);
    roles
}

fn default_status_rules() -> Vec<CategoryRule> {
    vec![
        rule("CONCLUÍDO", &["conclu"]),
        rule(
            "CURSANDO",
            &["cursando", "em curso", "em andamento", "andamento"],
        ),
        rule("DESISTENTE", &["desist"]),
        rule("NÃO COMPARECEU", &["nao compareceu", "faltou"]),
    ]
}

fn default_income_rules() -> Vec<CategoryRule> {
    vec![
        rule(
            "Não possui renda mensal",
            &["nao possui renda", "sem renda", "nao tem renda"],
        ),
        wage_rule(
            "Até meio salário mínimo",
            &["meio salario", "0.5 salario", "ate meio"],
            &[],
            None,
        ),
        wage_rule(
            "Até um salário mínimo",
            &["ate um", "ate 1", "um salario", "1 salario"],
            &["meio"],
            None,
        ),
        wage_rule(
            "De 1 a 2 salários mínimos",
            &["1 a 2", "1-2", "1 ate 2", "um a dois"],
            &[],
            Some((1, Some(2))),
        ),
        wage_rule(
            "De 2 a 3 salários mínimos",
            &["2 a 3", "2-3", "2 ate 3", "dois a tres"],
            &[],
            Some((2, Some(3))),
        ),
        wage_rule(
            "De 3 a 4 salários mínimos",
            &["3 a 4", "3-4", "3 ate 4", "tres a quatro"],
            &[],
            Some((3, Some(4))),
        ),
        wage_rule(
            "Acima de 5 salários mínimos",
            &["acima 5", "mais 5", "5 ou mais", "5+"],
            &[],
            Some((5, None)),
        ),
    ]
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn simple_groups(keywords: &[&str]) -> Vec<KeywordGroup> {
    keywords
        .iter()
        .map(|kw| vec![vec![kw.to_string()]])
        .collect()
}

fn composite(first: &[&str], second: &[&str]) -> KeywordGroup {
    vec![strings(first), strings(second)]
}

fn rule(label: &str, any: &[&str]) -> CategoryRule {
    CategoryRule {
        label: label.to_string(),
        any: strings(any),
        all: Vec::new(),
        none: Vec::new(),
        span: None,
    }
}

fn wage_rule(
    label: &str,
    any: &[&str],
    none: &[&str],
    span: Option<(u64, Option<u64>)>,
) -> CategoryRule {
    CategoryRule {
        label: label.to_string(),
        any: strings(any),
        all: vec!["salario".to_string()],
        none: strings(none),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_income_rules_are_ordered_low_to_high() {
        let vocab = Vocabulary::default();
        let labels: Vec<&str> = vocab
            .income_rules
            .iter()
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(labels.first(), Some(&"Não possui renda mensal"));
        assert_eq!(labels.last(), Some(&"Acima de 5 salários mínimos"));
    }

    #[test]
    fn vocabulary_round_trips_through_yaml() {
        let vocab = Vocabulary::default();
        let yaml = serde_yaml::to_string(&vocab).expect("serialize vocabulary");
        let parsed: Vocabulary = serde_yaml::from_str(&yaml).expect("parse vocabulary");
        assert_eq!(parsed.regions, vocab.regions);
        assert_eq!(parsed.status_rules.len(), vocab.status_rules.len());
    }

    #[test]
    fn partial_yaml_override_keeps_defaults() {
        let parsed: Vocabulary =
            serde_yaml::from_str("regions: [\"springfield\"]").expect("parse override");
        assert_eq!(parsed.regions, vec!["springfield".to_string()]);
        assert!(!parsed.link_keys.is_empty());
    }
}
