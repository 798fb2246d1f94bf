//! NDJSON to compressed CSV conversion
//!
//! Parses a complete NDJSON payload into rows and re-emits it as
//! gzip-compressed CSV with a header row, entirely in memory. Column order
//! is the order of first appearance across all records: the schema grows
//! monotonically as records are scanned, and downstream consumers rely on
//! that ordering.

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Write;
use tracing::debug;

use crate::error::TranscodeError;

/// One parsed NDJSON record. Key order is preserved by serde_json's
/// `preserve_order` feature, which the column discovery depends on.
type Record = Map<String, Value>;

/// Convert an NDJSON payload into gzip-compressed CSV bytes
pub fn transcode(input: &[u8]) -> Result<Vec<u8>, TranscodeError> {
    let records = parse_ndjson(input)?;
    let columns = discover_columns(&records);

    debug!(
        records = records.len(),
        columns = columns.len(),
        "Transcoding NDJSON to CSV"
    );

    let csv = write_csv(&columns, &records)?;
    compress(&csv)
}

/// Parse NDJSON input, one JSON object per line, tolerating blank lines.
/// Reports the 1-based line number of the first malformed record.
fn parse_ndjson(input: &[u8]) -> Result<Vec<Record>, TranscodeError> {
    let mut records = Vec::new();

    for (index, line) in input.split(|byte| *byte == b'\n').enumerate() {
        // Strips the \r left by CRLF line endings as well
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let record: Record = serde_json::from_slice(line)
            .map_err(|source| TranscodeError::ParseError {
                line: index + 1,
                source,
            })?;
        records.push(record);
    }

    Ok(records)
}

/// Column order = order of first appearance across all records, never sorted
fn discover_columns(records: &[Record]) -> Vec<String> {
    let mut columns = Vec::new();
    let mut seen = HashSet::new();

    for record in records {
        for key in record.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
    }

    columns
}

/// Serialize records as CSV with a header row. Missing fields render as
/// empty cells.
fn write_csv(columns: &[String], records: &[Record]) -> Result<Vec<u8>, TranscodeError> {
    // No discovered columns means no table to serialize
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(columns)?;
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| record.get(column).map(render_cell).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|err| TranscodeError::Csv(err.into_error().into()))
}

/// Render one JSON value as a CSV cell. Scalars render naturally, null as
/// an empty cell, and nested values as compact JSON.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}

/// Wrap the CSV output in standard gzip compression
fn compress(data: &[u8]) -> Result<Vec<u8>, TranscodeError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
