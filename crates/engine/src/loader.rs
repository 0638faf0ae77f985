//! Boundary loaders: raw CRM export files in, normalized records out.
//!
//! Loaders are deliberately lenient about individual rows — a record with
//! no id or an unparseable date is skipped and counted, not fatal — but
//! strict about file shape: unreadable files, malformed JSON/CSV, and
//! missing churn columns are hard errors.

use std::fs;
use std::path::Path;

use crate::config::{AttributeMap, ChurnColumns};
use crate::error::EngineError;
use crate::model::{ChurnEvent, Deal};
use crate::record::{parse_day_prefix, SourceRecord};

/// Parsed records plus how many input rows were dropped on the floor.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Deals
// ---------------------------------------------------------------------------

pub fn load_deals(path: &Path, attrs: &AttributeMap) -> Result<Loaded<Deal>, EngineError> {
    let data = fs::read_to_string(path)
        .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
    parse_deals(&data, attrs, &path.display().to_string())
}

pub fn parse_deals(
    data: &str,
    attrs: &AttributeMap,
    origin: &str,
) -> Result<Loaded<Deal>, EngineError> {
    let raw: Vec<SourceRecord> = serde_json::from_str(data).map_err(|e| {
        EngineError::RecordParse {
            path: origin.to_string(),
            msg: e.to_string(),
        }
    })?;

    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for rec in &raw {
        let Some(id) = rec.record_id() else {
            skipped += 1;
            continue;
        };
        records.push(Deal {
            id,
            owner_id: rec.reference_id(&attrs.owner),
            stage: rec.status_label(&attrs.stage),
            value_minor: rec.currency_minor(&attrs.value),
            close_date: rec.date_day(&attrs.close_date),
            onboarding_date: rec.date_day(&attrs.onboarding_date),
            linked_person_ids: rec.reference_ids(&attrs.linked_people),
            lead_owner_id: rec.reference_id(&attrs.lead_owner),
        });
    }
    Ok(Loaded { records, skipped })
}

// ---------------------------------------------------------------------------
// Churn
// ---------------------------------------------------------------------------

pub fn load_churn(path: &Path, cols: &ChurnColumns) -> Result<Loaded<ChurnEvent>, EngineError> {
    let data = fs::read_to_string(path)
        .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
    parse_churn(&data, cols)
}

pub fn parse_churn(data: &str, cols: &ChurnColumns) -> Result<Loaded<ChurnEvent>, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| EngineError::Io(format!("churn file: {e}")))?
        .clone();
    let idx = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| EngineError::MissingColumn {
                column: column.to_string(),
            })
    };
    let record_idx = idx(&cols.record_id)?;
    let date_idx = idx(&cols.cancel_date)?;

    let mut records = Vec::new();
    let mut skipped = 0;
    for row in reader.records() {
        let row = row.map_err(|e| EngineError::Io(format!("churn file: {e}")))?;
        let person = row.get(record_idx).unwrap_or("").trim();
        let raw_date = row.get(date_idx).unwrap_or("").trim();
        if person.is_empty() || raw_date.is_empty() {
            skipped += 1;
            continue;
        }
        let Some(cancelled_on) = parse_day_prefix(raw_date) else {
            skipped += 1;
            continue;
        };
        records.push(ChurnEvent {
            person_record_id: person.to_string(),
            cancelled_on,
        });
    }
    Ok(Loaded { records, skipped })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
