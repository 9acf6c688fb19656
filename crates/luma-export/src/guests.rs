use std::collections::HashSet;

use csv::ReaderBuilder;

use crate::error::ExportError;

pub const EMAIL_COLUMN: &str = "email";
pub const EVENT_NAME_COLUMN: &str = "event_name";
pub const EVENT_URL_COLUMN: &str = "event_url";

/// One registrant: the columns of the upstream guest CSV in upstream order,
/// with the owning event's name and URL appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestRow {
    fields: Vec<(String, String)>,
}

impl GuestRow {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.get(EMAIL_COLUMN)
    }
}

/// Parses a guest-list CSV body into rows annotated with the owning event.
///
/// The upstream export is not schema-validated, so parsing is flexible:
/// ragged records are tolerated and short records pad with empty values.
pub fn parse_guest_csv(
    text: &str,
    event_name: &str,
    event_url: &str,
) -> Result<Vec<GuestRow>, ExportError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let mut fields = Vec::with_capacity(headers.len() + 2);
        for (index, header) in headers.iter().enumerate() {
            let value = record.get(index).unwrap_or("");
            fields.push((header.to_string(), value.to_string()));
        }
        fields.push((EVENT_NAME_COLUMN.to_string(), event_name.to_string()));
        fields.push((EVENT_URL_COLUMN.to_string(), event_url.to_string()));
        rows.push(GuestRow::new(fields));
    }

    Ok(rows)
}

/// Keeps the first row per distinct email address, preserving input order.
/// Matching is exact and case-sensitive; rows without an email column are
/// always kept.
pub fn dedupe_by_email(rows: &[GuestRow]) -> Vec<GuestRow> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for row in rows {
        match row.email() {
            Some(email) => {
                if seen.insert(email.to_string()) {
                    unique.push(row.clone());
                }
            }
            None => unique.push(row.clone()),
        }
    }

    unique
}
