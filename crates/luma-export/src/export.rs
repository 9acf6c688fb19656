use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use crate::error::ExportError;
use crate::fetch::Event;
use crate::guests::GuestRow;

pub const EVENTS_PREFIX: &str = "events";
pub const REGISTRATIONS_PREFIX: &str = "registrations";
pub const UNIQUE_GUESTS_PREFIX: &str = "unique-guests";

/// `M-D-YYYY` without zero padding, matching the report filenames the
/// operators already archive (April 20 2024 -> `4-20-2024`).
pub fn date_stamp(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.month(), date.day(), date.year())
}

pub fn report_path(out_dir: &Path, prefix: &str, stamp: &str) -> PathBuf {
    out_dir.join(format!("{prefix}-{stamp}.csv"))
}

/// Writes the events report. Returns `false` when there was nothing to
/// write (no file is produced for an empty run).
pub fn write_events_csv(path: &Path, events: &[Event]) -> Result<bool, ExportError> {
    let rows: Vec<Vec<(String, String)>> = events.iter().map(event_row).collect();
    write_csv(path, &rows)
}

/// Writes a registrations or unique-guests report.
pub fn write_guests_csv(path: &Path, rows: &[GuestRow]) -> Result<bool, ExportError> {
    let rows: Vec<Vec<(String, String)>> = rows.iter().map(|row| row.fields().to_vec()).collect();
    write_csv(path, &rows)
}

/// Flattens an event into CSV columns: the typed fields first, then every
/// remaining upstream attribute, then the derived public URL.
pub fn event_row(event: &Event) -> Vec<(String, String)> {
    let mut fields = vec![
        ("api_id".to_string(), event.api_id.clone()),
        ("name".to_string(), event.name.clone()),
        ("url".to_string(), event.url.clone()),
        (
            "start_at".to_string(),
            event
                .start_at
                .map(|start| start.to_rfc3339())
                .unwrap_or_default(),
        ),
    ];
    for (key, value) in &event.extra {
        fields.push((key.clone(), flatten_value(value)));
    }
    fields.push(("event_url".to_string(), event.event_url()));
    fields
}

fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Serializes uniform rows of `(column, value)` pairs. The header is the
/// first row's key set; later rows are emitted by header lookup, so missing
/// keys become empty cells and extra keys are dropped.
fn write_csv(path: &Path, rows: &[Vec<(String, String)>]) -> Result<bool, ExportError> {
    let Some(first) = rows.first() else {
        return Ok(false);
    };
    let headers: Vec<&str> = first.iter().map(|(key, _)| key.as_str()).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in rows {
        let record: Vec<&str> = headers
            .iter()
            .map(|header| {
                row.iter()
                    .find(|(key, _)| key == header)
                    .map(|(_, value)| value.as_str())
                    .unwrap_or("")
            })
            .collect();
        writer.write_record(&record)?;
    }

    let data = writer
        .into_inner()
        .map_err(|err| ExportError::message(err.to_string()))?;

    let temp_path = build_temp_path(path);
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path)?;
    Ok(true)
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}
