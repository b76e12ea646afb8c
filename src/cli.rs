use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile and cross-filter cohort spreadsheets",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show which semantic role resolves to which column in each table
    Roles(RolesArgs),
    /// Reshape a long-format evaluations CSV into one row per respondent
    Pivot(PivotArgs),
    /// Apply a filter selection and print derived summaries
    Summary(SummaryArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Enrollments CSV file
    #[arg(long = "enrollments")]
    pub enrollments: PathBuf,
    /// Evaluations CSV file (long or wide format)
    #[arg(long = "evaluations")]
    pub evaluations: PathBuf,
    /// Students CSV file
    #[arg(long = "students")]
    pub students: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|'; sniffed when omitted)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (utf-8 then windows-1252 are tried when omitted)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML file overriding the built-in matching vocabulary
    #[arg(long)]
    pub vocab: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RolesArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
}

#[derive(Debug, Args)]
pub struct PivotArgs {
    /// Input evaluations CSV file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter character for reading input (sniffed when omitted)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter to use for output (defaults to comma)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML file overriding the built-in matching vocabulary
    #[arg(long)]
    pub vocab: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
    /// Restrict to one cycle (e.g. '2')
    #[arg(long)]
    pub cycle: Option<String>,
    /// Restrict to one location, matched exactly against the students table
    #[arg(long)]
    pub local: Option<String>,
    /// Restrict to one status label; 'CURSANDO + CONCLUÍDO' unions both
    #[arg(long)]
    pub status: Option<String>,
    /// Restrict to one gender value
    #[arg(long)]
    pub gender: Option<String>,
    /// Emit the summary as JSON instead of text tables
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
