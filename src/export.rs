//! Rendering and writing of exported records.
//!
//! JSON output is the record array indented with tabs. CSV output infers its
//! header from the records: the union of field names in first-appearance
//! order, with nested values JSON-encoded and missing values left empty.
//! Either format can instead carry a single projected field.

use crate::config::{Flatten, OutputFormat};
use crate::schemas::Record;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record {0} is not a JSON object")]
    NotTabular(usize),
}

/// Render records in the requested format, optionally projected onto one field
pub fn render<R: Record>(
    records: &[R],
    format: OutputFormat,
    flatten: Option<&Flatten<R::Field>>,
) -> Result<Vec<u8>, ExportError> {
    match (format, flatten) {
        (OutputFormat::Json, None) => to_json(&records),
        (OutputFormat::Json, Some(flatten)) => {
            let values: Vec<Value> = records.iter().map(|r| r.project(&flatten.key)).collect();
            let mut object = Map::new();
            object.insert(flatten.label.clone(), Value::Array(values));
            to_json(&Value::Object(object))
        }
        (OutputFormat::Csv, None) => {
            let rows = records
                .iter()
                .enumerate()
                .map(|(i, r)| match serde_json::to_value(r)? {
                    Value::Object(row) => Ok(row),
                    _ => Err(ExportError::NotTabular(i)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            to_csv(&rows)
        }
        (OutputFormat::Csv, Some(flatten)) => {
            let rows: Vec<Map<String, Value>> = records
                .iter()
                .map(|r| {
                    let mut row = Map::new();
                    row.insert(flatten.label.clone(), r.project(&flatten.key));
                    row
                })
                .collect();
            to_csv(&rows)
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

fn csv_cell(value: Option<&Value>) -> Result<String, ExportError> {
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested) => serde_json::to_string(nested)?,
    })
}

fn to_csv(rows: &[Map<String, Value>]) -> Result<Vec<u8>, ExportError> {
    let mut header: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if !header.is_empty() {
        writer.write_record(&header)?;
    }
    for row in rows {
        let cells = header
            .iter()
            .map(|key| csv_cell(row.get(*key)))
            .collect::<Result<Vec<_>, _>>()?;
        writer.write_record(&cells)?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// `<dir>/<name>.<json|csv>`
pub fn output_path(dir: &Path, name: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", name, format.extension()))
}

pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    info!("output file created {:?}", path);
    Ok(())
}
