use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Source records
// ---------------------------------------------------------------------------

/// A raw CRM record: an opaque id plus one-or-more "value slots" per
/// attribute.
///
/// Attribute slugs are workspace-configurable and slots are shaped
/// differently per attribute type (plain value, referenced record, actor
/// reference, currency, select option), so slots stay raw JSON and the
/// accessors below do the probing. A missing attribute — or a workspace
/// that never defined it — yields `None`/empty, never an error.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub values: BTreeMap<String, Vec<Value>>,
}

impl SourceRecord {
    /// The record's own identifier. Export shapes differ: `id` may be a
    /// bare string or an object carrying `record_id` / `entry_id`.
    pub fn record_id(&self) -> Option<String> {
        match &self.id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(map) => map
                .get("record_id")
                .or_else(|| map.get("entry_id"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    /// First value slot for an attribute. Scalar attributes always read the
    /// first slot; later slots are field history.
    pub fn scalar(&self, slug: &str) -> Option<&Value> {
        self.values.get(slug).and_then(|slots| slots.first())
    }

    /// Free-text reading of the first slot.
    pub fn text(&self, slug: &str) -> Option<String> {
        slot_text(self.scalar(slug)?)
    }

    /// Select/status attributes by display label, never internal codes.
    pub fn status_label(&self, slug: &str) -> Option<String> {
        let slot = self.scalar(slug)?;
        nested_title(slot, "status")
            .or_else(|| nested_title(slot, "option"))
            .or_else(|| slot_text(slot))
    }

    /// Currency amount in minor units; 0 when the attribute is null or
    /// missing. JSON numbers are currency units; strings go through
    /// integer-cent parsing.
    pub fn currency_minor(&self, slug: &str) -> i64 {
        let Some(slot) = self.scalar(slug) else { return 0 };
        let raw = slot
            .get("currency_value")
            .or_else(|| slot.get("value"))
            .unwrap_or(slot);
        match raw {
            Value::Number(n) => number_to_minor(n),
            Value::String(s) => parse_money_minor(s).unwrap_or(0),
            _ => 0,
        }
    }

    /// Day component of a raw date slot. Slots carry ISO-8601 timestamps or
    /// plain dates; only the `YYYY-MM-DD` prefix is trusted and anything
    /// failing the prefix check excludes the record from month bucketing.
    pub fn date_day(&self, slug: &str) -> Option<NaiveDate> {
        let text = slot_text(self.scalar(slug)?)?;
        parse_day_prefix(&text)
    }

    /// First slot's referenced record id.
    pub fn reference_id(&self, slug: &str) -> Option<String> {
        let slot = self.scalar(slug)?;
        slot.get("target_record_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| slot_text(slot))
    }

    /// Every slot's referenced record id. Linked-people attributes are
    /// genuinely multi-valued — the churn reverse-lookup needs all of them,
    /// not just the first slot.
    pub fn reference_ids(&self, slug: &str) -> Vec<String> {
        let Some(slots) = self.values.get(slug) else {
            return Vec::new();
        };
        slots
            .iter()
            .filter_map(|slot| {
                slot.get("target_record_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| slot_text(slot))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Slot probing
// ---------------------------------------------------------------------------

/// Probe order mirrors the CRM's slot shapes: explicit value, referenced
/// record, actor reference, currency, then a bare JSON primitive.
fn slot_text(slot: &Value) -> Option<String> {
    for key in ["value", "target_record_id", "referenced_actor_id", "currency_value"] {
        if let Some(s) = slot.get(key).and_then(value_to_string) {
            return Some(s);
        }
    }
    value_to_string(slot)
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn nested_title(slot: &Value, key: &str) -> Option<String> {
    slot.get(key)?
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn number_to_minor(n: &serde_json::Number) -> i64 {
    if let Some(i) = n.as_i64() {
        i.saturating_mul(100)
    } else {
        n.as_f64().map(|f| (f * 100.0).round() as i64).unwrap_or(0)
    }
}

/// Parse a money string into minor units with integer math: handles `$`,
/// thousands separators, a leading `-` or parenthesized negatives, and at
/// most two decimal places.
pub fn parse_money_minor(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let (s, negative) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (&s[1..s.len() - 1], true)
    } else if let Some(rest) = s.strip_prefix('-') {
        (rest, true)
    } else {
        (s, false)
    };
    let cleaned: String = s
        .chars()
        .filter(|c| *c != '$' && *c != ',' && *c != ' ')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let (units, frac) = match cleaned.split_once('.') {
        Some((u, f)) => (u, f),
        None => (cleaned.as_str(), ""),
    };
    if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let units: i64 = if units.is_empty() { 0 } else { units.parse().ok()? };
    let frac_minor: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let total = units.checked_mul(100)?.checked_add(frac_minor)?;
    Some(if negative { -total } else { total })
}

/// `YYYY-MM-DD` prefix of a raw date string, validated as a real date.
pub fn parse_day_prefix(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(values: Value) -> SourceRecord {
        serde_json::from_value(json!({
            "id": { "record_id": "rec_1" },
            "values": values,
        }))
        .unwrap()
    }

    #[test]
    fn record_id_handles_both_shapes() {
        let nested = record(json!({}));
        assert_eq!(nested.record_id().as_deref(), Some("rec_1"));

        let bare: SourceRecord =
            serde_json::from_value(json!({ "id": "rec_2", "values": {} })).unwrap();
        assert_eq!(bare.record_id().as_deref(), Some("rec_2"));

        let none: SourceRecord = serde_json::from_value(json!({ "values": {} })).unwrap();
        assert_eq!(none.record_id(), None);
    }

    #[test]
    fn scalar_reads_first_slot_only() {
        let rec = record(json!({
            "stage": [
                { "status": { "title": "Closed Won" } },
                { "status": { "title": "Live" } },
            ],
        }));
        assert_eq!(rec.status_label("stage").as_deref(), Some("Closed Won"));
    }

    #[test]
    fn missing_attribute_is_none_not_error() {
        let rec = record(json!({}));
        assert_eq!(rec.text("anything"), None);
        assert_eq!(rec.status_label("stage"), None);
        assert_eq!(rec.date_day("close_date"), None);
        assert_eq!(rec.currency_minor("value"), 0);
        assert!(rec.reference_ids("associated_people").is_empty());
    }

    #[test]
    fn status_label_prefers_display_title() {
        let rec = record(json!({
            "stage": [ { "status": { "id": "stg_91", "title": "To Be Onboarded" } } ],
        }));
        assert_eq!(rec.status_label("stage").as_deref(), Some("To Be Onboarded"));

        let plain = record(json!({ "stage": [ { "value": "Closed Lost" } ] }));
        assert_eq!(plain.status_label("stage").as_deref(), Some("Closed Lost"));
    }

    #[test]
    fn currency_converts_units_to_minor() {
        let int = record(json!({ "value": [ { "currency_value": 130000 } ] }));
        assert_eq!(int.currency_minor("value"), 13_000_000);

        let frac = record(json!({ "value": [ { "currency_value": 1234.56 } ] }));
        assert_eq!(frac.currency_minor("value"), 123_456);

        let string = record(json!({ "value": [ { "value": "$1,234.56" } ] }));
        assert_eq!(string.currency_minor("value"), 123_456);

        let null = record(json!({ "value": [ { "currency_value": null } ] }));
        assert_eq!(null.currency_minor("value"), 0);
    }

    #[test]
    fn parse_money_minor_handles_negatives() {
        assert_eq!(parse_money_minor("-12.34"), Some(-1234));
        assert_eq!(parse_money_minor("(12.34)"), Some(-1234));
        assert_eq!(parse_money_minor("$1,000"), Some(100_000));
        assert_eq!(parse_money_minor("0.5"), Some(50));
        assert_eq!(parse_money_minor("12.345"), None);
        assert_eq!(parse_money_minor(""), None);
    }

    #[test]
    fn date_day_truncates_timestamps() {
        let rec = record(json!({
            "close_date": [ { "value": "2026-02-10T18:22:05.000000000Z" } ],
        }));
        assert_eq!(
            rec.date_day("close_date"),
            NaiveDate::from_ymd_opt(2026, 2, 10)
        );
    }

    #[test]
    fn malformed_date_is_none() {
        let rec = record(json!({ "close_date": [ { "value": "next tuesday" } ] }));
        assert_eq!(rec.date_day("close_date"), None);

        let partial = record(json!({ "close_date": [ { "value": "2026-02" } ] }));
        assert_eq!(partial.date_day("close_date"), None);

        let invalid = record(json!({ "close_date": [ { "value": "2026-02-30" } ] }));
        assert_eq!(invalid.date_day("close_date"), None);
    }

    #[test]
    fn reference_ids_scans_every_slot() {
        let rec = record(json!({
            "associated_people": [
                { "target_record_id": "person-a" },
                { "target_record_id": "person-b" },
                { "value": "person-c" },
            ],
        }));
        assert_eq!(
            rec.reference_ids("associated_people"),
            vec!["person-a", "person-b", "person-c"]
        );
        // scalar variant still reads only the first
        assert_eq!(rec.reference_id("associated_people").as_deref(), Some("person-a"));
    }

    #[test]
    fn actor_references_resolve() {
        let rec = record(json!({
            "owner": [ { "referenced_actor_type": "workspace-member",
                         "referenced_actor_id": "50cf242c-7fa3-4cad-87d0-75b1af71c1c7" } ],
        }));
        assert_eq!(
            rec.reference_id("owner").as_deref(),
            Some("50cf242c-7fa3-4cad-87d0-75b1af71c1c7")
        );
    }
}
