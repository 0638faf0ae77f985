//! Attio CRM adapter for `qbook fetch`.
//!
//! Attio's query endpoints are POST-with-offset: each page returns up to
//! `limit` records under a `data` key, and a short page ends the scan.
//! Deal records are written as raw JSON for the normalizer to pick apart;
//! list entries are flattened client-side into the churn CSV because the
//! entries endpoint cannot filter on entry attributes server-side.

use std::path::PathBuf;

use serde_json::{json, Value};

use crate::exit_codes;
use crate::CliError;

use super::common::{self, ChurnRow, FetchClient};

// ── Constants ───────────────────────────────────────────────────────

const ATTIO_API_BASE: &str = "https://api.attio.com/v2";
const PAGE_SIZE: usize = 500;
/// Hard stop so an upstream that keeps echoing full pages cannot loop
/// forever.
const MAX_PAGES: usize = 200;

// ── Attio client ────────────────────────────────────────────────────

struct AttioClient {
    client: FetchClient,
    api_key: String,
    base_url: String,
    page_size: usize,
}

impl AttioClient {
    fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, ATTIO_API_BASE.to_string())
    }

    fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: FetchClient::new("Attio", extract_attio_error),
            api_key,
            base_url,
            page_size: PAGE_SIZE,
        }
    }

    #[cfg(test)]
    fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Page through one query endpoint. `Ok(None)` means the slug does not
    /// exist in this workspace; the caller decides whether that is fatal.
    fn query_pages(
        &self,
        url: &str,
        mut body: serde_json::Map<String, Value>,
        quiet: bool,
    ) -> Result<Option<Vec<Value>>, CliError> {
        let mut all = Vec::new();
        let show_progress = !quiet && atty::is(atty::Stream::Stderr);

        for page in 0..MAX_PAGES {
            body.insert("limit".to_string(), json!(self.page_size));
            body.insert("offset".to_string(), json!(all.len()));
            let payload = Value::Object(body.clone());
            let api_key = self.api_key.clone();

            let Some(resp) = self.client.request_with_retry(|http| {
                http.post(url).bearer_auth(&api_key).json(&payload)
            })?
            else {
                return Ok(None);
            };

            let data = resp["data"].as_array().ok_or_else(|| CliError {
                code: exit_codes::EXIT_FETCH_UPSTREAM,
                message: "Attio response missing 'data' array".to_string(),
                hint: None,
            })?;

            let n = data.len();
            all.extend(data.iter().cloned());
            if show_progress {
                eprintln!("  page {}: {} records", page + 1, n);
            }
            if n < self.page_size {
                return Ok(Some(all));
            }
        }

        Err(CliError {
            code: exit_codes::EXIT_FETCH_UPSTREAM,
            message: format!("Attio pagination exceeded {MAX_PAGES} pages at {url}"),
            hint: None,
        })
    }

    /// All records of `object` matching any of the given stage labels.
    /// Attio status filters match one label per query, so stages fetch
    /// sequentially.
    fn query_deals(
        &self,
        object: &str,
        stage_attr: &str,
        stages: &[String],
        quiet: bool,
    ) -> Result<Vec<Value>, CliError> {
        let url = format!("{}/objects/{}/records/query", self.base_url, object);
        let mut records = Vec::new();

        for stage in stages {
            let mut filter = serde_json::Map::new();
            filter.insert(stage_attr.to_string(), json!(stage));
            let mut body = serde_json::Map::new();
            body.insert("filter".to_string(), Value::Object(filter));

            let page = self.query_pages(&url, body, quiet)?.ok_or_else(|| CliError {
                code: exit_codes::EXIT_FETCH_VALIDATION,
                message: format!("Attio object '{object}' not found (404)"),
                hint: Some("check --object; the workspace may use a different slug".to_string()),
            })?;
            records.extend(page);
        }

        records.sort_by_key(record_sort_key);
        Ok(records)
    }

    /// Entries of the churn list. `Ok(None)` when the list does not exist;
    /// unlike deals, a missing churn list is routine for young workspaces.
    fn query_list_entries(&self, list: &str, quiet: bool) -> Result<Option<Vec<Value>>, CliError> {
        let url = format!("{}/lists/{}/entries/query", self.base_url, list);
        self.query_pages(&url, serde_json::Map::new(), quiet)
    }
}

fn record_sort_key(record: &Value) -> String {
    record["id"]["record_id"]
        .as_str()
        .or_else(|| record["id"].as_str())
        .unwrap_or_default()
        .to_string()
}

// ── Entry flattening ────────────────────────────────────────────────

/// Flatten list entries into churn rows. Entries scatter attributes across
/// `entry_values`, `record_values`, or `values` depending on list type and
/// API version; the first populated slot wins. Entries with no parent
/// record or no cancellation date are dropped.
fn churn_rows(entries: &[Value], cancel_attr: &str) -> Vec<ChurnRow> {
    let mut rows: Vec<ChurnRow> = entries
        .iter()
        .filter_map(|entry| {
            let person = entry.get("parent_record_id").and_then(Value::as_str)?;
            let date = entry_attr_text(entry, cancel_attr)?;
            Some(ChurnRow {
                person_record_id: person.to_string(),
                cancellation_requested_at: date,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.person_record_id
            .cmp(&b.person_record_id)
            .then_with(|| a.cancellation_requested_at.cmp(&b.cancellation_requested_at))
    });
    rows
}

fn entry_attr_text(entry: &Value, attr: &str) -> Option<String> {
    for values_key in ["entry_values", "record_values", "values"] {
        let Some(slot) = entry
            .get(values_key)
            .and_then(|values| values.get(attr))
            .and_then(|slots| slots.get(0))
        else {
            continue;
        };
        let raw = slot.get("value").unwrap_or(slot);
        if let Some(text) = raw.as_str() {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

// ── Error extraction ────────────────────────────────────────────────

fn extract_attio_error(body: &Value, status: u16) -> String {
    body["message"]
        .as_str()
        .unwrap_or(&format!("HTTP {}", status))
        .to_string()
}

// ── Entry points ────────────────────────────────────────────────────

pub(super) fn cmd_deals(
    stages: Vec<String>,
    object: String,
    stage_attr: String,
    api_key: Option<String>,
    out: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let key = resolve_api_key(api_key)?;
    let stages = if stages.is_empty() {
        vec!["Closed Won".to_string(), "Closed Lost".to_string()]
    } else {
        stages
    };

    let show_progress = !quiet && atty::is(atty::Stream::Stderr);
    if show_progress {
        eprintln!(
            "Fetching Attio '{}' records ({} stage filters)...",
            object,
            stages.len(),
        );
    }

    let client = AttioClient::new(key);
    let records = client.query_deals(&object, &stage_attr, &stages, quiet)?;
    let out_label = common::write_json(&records, &out)?;

    if show_progress {
        eprintln!("Done: {} records written to {}", records.len(), out_label);
    }
    Ok(())
}

pub(super) fn cmd_churn(
    list: String,
    cancel_attr: String,
    api_key: Option<String>,
    out: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let key = resolve_api_key(api_key)?;

    let show_progress = !quiet && atty::is(atty::Stream::Stderr);
    if show_progress {
        eprintln!("Fetching Attio list '{}' entries...", list);
    }

    let client = AttioClient::new(key);
    let rows = match client.query_list_entries(&list, quiet)? {
        Some(entries) => churn_rows(&entries, &cancel_attr),
        None => {
            eprintln!("warning: list '{list}' not found; writing an empty churn file");
            Vec::new()
        }
    };
    let out_label = common::write_churn_csv(&rows, &out)?;

    if show_progress {
        eprintln!("Done: {} churn rows written to {}", rows.len(), out_label);
    }
    Ok(())
}

fn resolve_api_key(flag: Option<String>) -> Result<String, CliError> {
    common::resolve_api_key(flag, "Attio", "ATTIO_API_KEY")
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn deal(id: &str, stage: &str) -> Value {
        json!({
            "id": { "record_id": id },
            "values": {
                "stage": [ { "status": { "title": stage } } ],
                "value": [ { "currency_value": 1000 } ],
            },
        })
    }

    fn client_for(server: &MockServer) -> AttioClient {
        AttioClient::with_base_url("sk-test".to_string(), server.base_url())
    }

    #[test]
    fn deals_paginate_until_a_short_page() {
        let server = MockServer::start();
        let page1 = server.mock(|when, then| {
            when.method(POST)
                .path("/objects/deals/records/query")
                .json_body_includes(r#"{ "offset": 0 }"#);
            then.status(200)
                .json_body(json!({ "data": [deal("rec-c", "Closed Won"), deal("rec-a", "Closed Won")] }));
        });
        let page2 = server.mock(|when, then| {
            when.method(POST)
                .path("/objects/deals/records/query")
                .json_body_includes(r#"{ "offset": 2 }"#);
            then.status(200)
                .json_body(json!({ "data": [deal("rec-b", "Closed Won")] }));
        });

        let client = client_for(&server).with_page_size(2);
        let records = client
            .query_deals("deals", "stage", &["Closed Won".to_string()], true)
            .unwrap();

        page1.assert();
        page2.assert();
        assert_eq!(records.len(), 3);
        // Output order is by record id, not arrival order
        let ids: Vec<&str> = records
            .iter()
            .map(|r| r["id"]["record_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["rec-a", "rec-b", "rec-c"]);
    }

    #[test]
    fn each_stage_filter_runs_its_own_query() {
        let server = MockServer::start();
        let won = server.mock(|when, then| {
            when.method(POST)
                .path("/objects/deals/records/query")
                .json_body_includes(r#"{ "filter": { "stage": "Closed Won" } }"#);
            then.status(200)
                .json_body(json!({ "data": [deal("rec-won", "Closed Won")] }));
        });
        let lost = server.mock(|when, then| {
            when.method(POST)
                .path("/objects/deals/records/query")
                .json_body_includes(r#"{ "filter": { "stage": "Closed Lost" } }"#);
            then.status(200)
                .json_body(json!({ "data": [deal("rec-lost", "Closed Lost")] }));
        });

        let client = client_for(&server);
        let stages = vec!["Closed Won".to_string(), "Closed Lost".to_string()];
        let records = client.query_deals("deals", "stage", &stages, true).unwrap();

        won.assert();
        lost.assert();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn rate_limit_exhausts_retries_then_fails() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/objects/deals/records/query");
            then.status(429)
                .header("retry-after", "0")
                .json_body(json!({ "message": "Too many requests" }));
        });

        let client = client_for(&server);
        let err = client
            .query_deals("deals", "stage", &["Closed Won".to_string()], true)
            .unwrap_err();

        // Initial attempt + MAX_RETRIES
        mock.assert_calls(4);
        assert_eq!(err.code, exit_codes::EXIT_FETCH_RATE_LIMIT);
        assert!(err.message.contains("rate limited"), "{}", err.message);
    }

    #[test]
    fn auth_failure_fails_fast() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/objects/deals/records/query");
            then.status(401)
                .json_body(json!({ "message": "Invalid bearer token" }));
        });

        let client = client_for(&server);
        let err = client
            .query_deals("deals", "stage", &["Closed Won".to_string()], true)
            .unwrap_err();

        mock.assert_calls(1);
        assert_eq!(err.code, exit_codes::EXIT_FETCH_AUTH);
        assert!(err.message.contains("Invalid bearer token"), "{}", err.message);
    }

    #[test]
    fn unknown_object_is_a_validation_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/objects/opportunities/records/query");
            then.status(404).json_body(json!({ "message": "Not found" }));
        });

        let client = client_for(&server);
        let err = client
            .query_deals("opportunities", "stage", &["Closed Won".to_string()], true)
            .unwrap_err();

        assert_eq!(err.code, exit_codes::EXIT_FETCH_VALIDATION);
        assert!(err.message.contains("'opportunities'"), "{}", err.message);
        assert!(err.hint.unwrap().contains("--object"));
    }

    #[test]
    fn missing_list_is_not_fatal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/lists/churned_customers/entries/query");
            then.status(404).json_body(json!({ "message": "Not found" }));
        });

        let client = client_for(&server);
        let entries = client.query_list_entries("churned_customers", true).unwrap();
        assert!(entries.is_none());
    }

    #[test]
    fn list_entries_page_through_the_entries_endpoint() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/lists/churned_customers/entries/query")
                .json_body_includes(r#"{ "offset": 0 }"#);
            then.status(200).json_body(json!({
                "data": [ { "parent_record_id": "person-1" } ],
            }));
        });

        let client = client_for(&server);
        let entries = client
            .query_list_entries("churned_customers", true)
            .unwrap()
            .unwrap();

        mock.assert();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn churn_rows_probe_all_value_maps() {
        let entries = vec![
            json!({
                "parent_record_id": "person-b",
                "entry_values": { "cancellation_requested_at": [ { "value": "2026-03-05" } ] },
            }),
            json!({
                "parent_record_id": "person-a",
                "record_values": { "cancellation_requested_at": [ { "value": "2026-02-11T09:00:00Z" } ] },
            }),
            json!({
                "parent_record_id": "person-c",
                "values": { "cancellation_requested_at": [ "2026-01-20" ] },
            }),
            // No cancellation date: dropped
            json!({
                "parent_record_id": "person-d",
                "entry_values": { "other_attr": [ { "value": "x" } ] },
            }),
            // No parent record: dropped
            json!({
                "entry_values": { "cancellation_requested_at": [ { "value": "2026-01-01" } ] },
            }),
        ];

        let rows = churn_rows(&entries, "cancellation_requested_at");
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            ChurnRow {
                person_record_id: "person-a".to_string(),
                cancellation_requested_at: "2026-02-11T09:00:00Z".to_string(),
            }
        );
        assert_eq!(rows[1].person_record_id, "person-b");
        assert_eq!(rows[2].person_record_id, "person-c");
    }

    #[test]
    fn churn_csv_always_carries_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("churn.csv");

        common::write_churn_csv(&[], &Some(path.clone())).unwrap();
        let empty = std::fs::read_to_string(&path).unwrap();
        assert_eq!(empty, "person_record_id,cancellation_requested_at\n");

        let rows = vec![ChurnRow {
            person_record_id: "person-a".to_string(),
            cancellation_requested_at: "2026-03-05".to_string(),
        }];
        common::write_churn_csv(&rows, &Some(path.clone())).unwrap();
        let full = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            full,
            "person_record_id,cancellation_requested_at\nperson-a,2026-03-05\n"
        );
    }

    #[test]
    fn api_key_flag_overrides_and_trims() {
        let key = resolve_api_key(Some("  sk-live-abc  ".to_string())).unwrap();
        assert_eq!(key, "sk-live-abc");
    }

    #[test]
    fn blank_api_key_flag_is_missing() {
        let err = resolve_api_key(Some("   ".to_string())).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_NOT_AUTH);
    }

    #[test]
    fn missing_api_key_names_both_sources() {
        std::env::remove_var("ATTIO_API_KEY");
        let err = resolve_api_key(None).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_NOT_AUTH);
        assert!(err.message.contains("--api-key"), "{}", err.message);
        assert!(err.message.contains("ATTIO_API_KEY"), "{}", err.message);
    }
}
