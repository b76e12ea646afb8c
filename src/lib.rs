pub mod category;
pub mod cli;
pub mod dataset;
pub mod engine;
pub mod filters;
pub mod io_utils;
pub mod metrics;
pub mod pivot;
pub mod roles;
pub mod table;
pub mod text;
pub mod vocab;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};
use crate::vocab::Vocabulary;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("cohort_lens", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Roles(args) => handle_roles(&args),
        Commands::Pivot(args) => handle_pivot(&args),
        Commands::Summary(args) => engine::execute(&args),
    }
}

fn handle_roles(args: &cli::RolesArgs) -> Result<()> {
    let vocab = Vocabulary::load_or_default(args.inputs.vocab.as_deref())?;
    let inputs = [
        ("enrollments", &args.inputs.enrollments),
        ("evaluations", &args.inputs.evaluations),
        ("students", &args.inputs.students),
    ];
    for (label, path) in inputs {
        let loaded = io_utils::load_table(
            path,
            args.inputs.delimiter,
            args.inputs.input_encoding.as_deref(),
        )
        .with_context(|| format!("Loading {label} table"))?;
        println!("{label} ({} rows):", loaded.len());
        let headers = vec!["role".to_string(), "column".to_string()];
        let rows: Vec<Vec<String>> = engine::role_map(&loaded, &vocab)
            .into_iter()
            .map(|(role, column)| {
                vec![role, column.unwrap_or_else(|| "(unavailable)".to_string())]
            })
            .collect();
        table::print_table(&headers, &rows);
        println!();
    }
    Ok(())
}

fn handle_pivot(args: &cli::PivotArgs) -> Result<()> {
    let vocab = Vocabulary::load_or_default(args.vocab.as_deref())?;
    let loaded = io_utils::load_table(&args.input, args.delimiter, args.input_encoding.as_deref())
        .with_context(|| format!("Loading evaluations from {:?}", args.input))?;
    let was_long = pivot::is_long_format(&loaded, &vocab);
    let wide = pivot::pivot(&loaded, &vocab);
    info!(
        "pivot: {} input row(s) -> {} output row(s) ({})",
        loaded.len(),
        wide.len(),
        if was_long { "reshaped" } else { "already wide" }
    );
    let delimiter = args
        .output_delimiter
        .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
    io_utils::write_table(&wide, args.output.as_deref(), delimiter)
        .context("Writing pivoted table")
}
