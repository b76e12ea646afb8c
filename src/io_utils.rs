//! CSV loading and writing for tables of unknown provenance.
//!
//! Spreadsheet exports from the field arrive with unpredictable delimiters
//! (Brazilian sheets favour `;`) and encodings (UTF-8 or some Windows-1252
//! relative). Loading therefore:
//!
//! - resolves the delimiter from an explicit override, the file extension,
//!   or a counting sniff over the header line (`;` before `,`);
//! - decodes via `encoding_rs`, trying UTF-8 first and falling back to
//!   Windows-1252 when the bytes do not decode cleanly;
//! - tolerates ragged rows — short rows are padded, never rejected.
//!
//! Output (the `pivot` subcommand) always writes UTF-8 with full quoting.

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::debug;

use crate::dataset::Table;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Sniff candidates in preference order for equal counts.
const SNIFF_CANDIDATES: &[u8] = &[b';', b',', b'\t', b'|'];

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .map(Some)
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(None),
    }
}

/// Delimiter for an input file: explicit override, `.tsv` extension, then a
/// counting sniff over the first line, defaulting to comma.
pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>, sample: &[u8]) -> u8 {
    if let Some(delimiter) = provided {
        return delimiter;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => sniff_delimiter(sample),
    }
}

/// Counts candidate delimiters in the header line and keeps the most
/// frequent, preferring `;` on ties — the common case for pt-BR exports.
pub fn sniff_delimiter(sample: &[u8]) -> u8 {
    let header_line = sample.split(|b| *b == b'\n').next().unwrap_or_default();
    let mut best = DEFAULT_CSV_DELIMITER;
    let mut best_count = 0usize;
    for candidate in SNIFF_CANDIDATES {
        let count = header_line.iter().filter(|b| *b == candidate).count();
        if count > best_count {
            best = *candidate;
            best_count = count;
        }
    }
    best
}

/// Loads one CSV file into a [`Table`], resolving delimiter and encoding as
/// documented on the module.
pub fn load_table(
    path: &Path,
    delimiter: Option<u8>,
    encoding_label: Option<&str>,
) -> Result<Table> {
    let mut bytes = Vec::new();
    File::open(path)
        .with_context(|| format!("Opening input file {path:?}"))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("Reading input file {path:?}"))?;

    let delimiter = resolve_input_delimiter(path, delimiter, &bytes);
    let encodings: Vec<&'static Encoding> = match resolve_encoding(encoding_label)? {
        Some(encoding) => vec![encoding],
        None => vec![UTF_8, WINDOWS_1252],
    };

    let mut last_error = None;
    for encoding in encodings {
        match parse_table(&bytes, delimiter, encoding) {
            Ok(table) => {
                debug!(
                    "loaded {path:?}: {} row(s), {} column(s), encoding {}",
                    table.len(),
                    table.columns().len(),
                    encoding.name()
                );
                return Ok(table);
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("No encoding candidates for {path:?}")))
        .with_context(|| format!("Decoding {path:?}"))
}

fn parse_table(bytes: &[u8], delimiter: u8, encoding: &'static Encoding) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(bytes);
    let headers = decode_record(reader.byte_headers().context("Reading headers")?, encoding)?;
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        rows.push(decode_record(&record, encoding)?);
    }
    Ok(Table::from_rows(headers, rows))
}

fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Writes a table as UTF-8 CSV to a file, or stdout for `-`/absent paths.
pub fn write_table(table: &Table, path: Option<&Path>, delimiter: u8) -> Result<()> {
    let sink: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .from_writer(sink);
    writer
        .write_record(table.columns())
        .context("Writing headers")?;
    for row in table.rows() {
        writer.write_record(row).context("Writing row")?;
    }
    writer.flush().context("Flushing output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn sniffs_semicolon_delimited_headers() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter(b"a,b,c\n"), b',');
        assert_eq!(sniff_delimiter(b"single\n"), b',');
    }

    #[test]
    fn loads_windows_1252_files_via_fallback() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("alunos.csv");
        let mut file = File::create(&path).expect("create csv");
        // "REGIÃO" in Windows-1252: the lone 0xC3 byte is invalid UTF-8.
        file.write_all(b"NOME,REGI\xC3O\nAna,Guar\xE1\n")
            .expect("write csv");
        drop(file);

        let table = load_table(&path, None, None).expect("load table");
        assert_eq!(table.columns()[1], "REGIÃO");
        assert_eq!(table.cell(0, 1), Some("Guará"));
    }

    #[test]
    fn ragged_rows_are_padded_not_rejected() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("ragged.csv");
        std::fs::write(&path, "a,b,c\n1,2\n4,5,6,7\n").expect("write csv");
        let table = load_table(&path, None, None).expect("load table");
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 2), None);
    }

    #[test]
    fn explicit_encoding_label_is_honoured() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("latin.csv");
        std::fs::write(&path, b"CIDADE\nBras\xEDlia\n").expect("write csv");
        let table = load_table(&path, None, Some("latin1")).expect("load table");
        assert_eq!(table.cell(0, 0), Some("Brasília"));
    }
}
