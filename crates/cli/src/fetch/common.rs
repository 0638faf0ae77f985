//! Shared infrastructure for `qbook fetch` adapters.
//!
//! The Attio adapter reuses:
//! - `FetchClient` — HTTP client with retry / backoff / error classification
//! - `ChurnRow` — the two-column churn CSV schema
//! - `resolve_api_key` — flag > env > error
//! - `write_json` / `write_churn_csv` — open output, write, flush
//!
//! # ChurnRow Contract
//!
//! `qbook run --churn` consumes these files, so the shape is fixed:
//!
//! | # | Column                      | Description                         |
//! |---|-----------------------------|-------------------------------------|
//! | 1 | `person_record_id`          | CRM person the cancellation is for  |
//! | 2 | `cancellation_requested_at` | Raw date string from the CRM        |
//!
//! - **Column order**: fixed, serialized by `serde` in struct field order.
//! - **Sort order**: deterministic. Adapters sort before writing; two runs
//!   over the same data MUST produce byte-identical CSV.
//! - **Dates**: passed through raw. The engine's loader truncates to the
//!   `YYYY-MM-DD` prefix and skips unparseable rows.

use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::exit_codes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub(super) const MAX_RETRIES: u32 = 3;
pub(super) const USER_AGENT: &str = concat!("qbook/", env!("CARGO_PKG_VERSION"));

// ── Canonical churn row ─────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(super) struct ChurnRow {
    pub person_record_id: String,
    pub cancellation_requested_at: String,
}

// ── FetchClient ─────────────────────────────────────────────────────

/// Shared HTTP client that handles retry, backoff, and error classification.
///
/// Adapters own their API key, base URL, and auth method. They pass a
/// request-building closure to [`FetchClient::request_with_retry`] which
/// handles the retry loop and maps HTTP status codes to the standard exit
/// codes.
pub(super) struct FetchClient {
    pub(super) http: reqwest::blocking::Client,
    source_name: String,
    error_extractor: fn(&serde_json::Value, u16) -> String,
}

impl FetchClient {
    pub(super) fn new(
        source_name: &str,
        error_extractor: fn(&serde_json::Value, u16) -> String,
    ) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            source_name: source_name.to_string(),
            error_extractor,
        }
    }

    /// Send a request with retry + exponential backoff.
    ///
    /// `build_request` is called once per attempt. It receives the
    /// underlying `reqwest::blocking::Client` and must return a fully
    /// configured `RequestBuilder` (URL, auth, body).
    ///
    /// Returns `Ok(None)` on 404: workspaces legitimately lack optional
    /// objects and lists, and the caller decides whether that is fatal.
    pub(super) fn request_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<Option<serde_json::Value>, CliError> {
        let mut backoff_secs = 1u64;

        for attempt in 0..=MAX_RETRIES {
            let req = build_request(&self.http);
            let result = req.send();

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    // Auth errors: fail immediately
                    if status == 401 || status == 403 {
                        let body: serde_json::Value =
                            resp.json().unwrap_or(serde_json::Value::Null);
                        let msg = (self.error_extractor)(&body, status);
                        return Err(CliError {
                            code: exit_codes::EXIT_FETCH_AUTH,
                            message: format!(
                                "{} auth failed ({}): {}",
                                self.source_name, status, msg,
                            ),
                            hint: None,
                        });
                    }

                    // Bad request: fail immediately
                    if status == 400 {
                        let body: serde_json::Value =
                            resp.json().unwrap_or(serde_json::Value::Null);
                        let msg = (self.error_extractor)(&body, status);
                        return Err(CliError {
                            code: exit_codes::EXIT_FETCH_VALIDATION,
                            message: format!(
                                "{} request rejected ({}): {}",
                                self.source_name, status, msg,
                            ),
                            hint: None,
                        });
                    }

                    // Unknown slug: the caller decides whether this is fatal
                    if status == 404 {
                        return Ok(None);
                    }

                    // Other 4xx (not 429): fail immediately
                    if status >= 400 && status < 500 && status != 429 {
                        let body: serde_json::Value =
                            resp.json().unwrap_or(serde_json::Value::Null);
                        let msg = (self.error_extractor)(&body, status);
                        return Err(CliError {
                            code: exit_codes::EXIT_FETCH_UPSTREAM,
                            message: format!(
                                "{} error ({}): {}",
                                self.source_name, status, msg,
                            ),
                            hint: None,
                        });
                    }

                    // Retryable: 429, 5xx
                    if status == 429 || status >= 500 {
                        if attempt == MAX_RETRIES {
                            let exit_code = if status == 429 {
                                exit_codes::EXIT_FETCH_RATE_LIMIT
                            } else {
                                exit_codes::EXIT_FETCH_UPSTREAM
                            };
                            return Err(CliError {
                                code: exit_code,
                                message: format!(
                                    "{} {} after {} attempts ({})",
                                    self.source_name,
                                    if status == 429 {
                                        "rate limited"
                                    } else {
                                        "upstream error"
                                    },
                                    MAX_RETRIES,
                                    status,
                                ),
                                hint: None,
                            });
                        }

                        // Respect Retry-After header for 429
                        let wait = if status == 429 {
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.parse::<u64>().ok())
                                .unwrap_or(backoff_secs)
                        } else {
                            backoff_secs
                        };

                        eprintln!(
                            "warning: retry {}/{} in {}s (HTTP {})",
                            attempt + 1,
                            MAX_RETRIES,
                            wait,
                            status,
                        );
                        thread::sleep(Duration::from_secs(wait));
                        backoff_secs *= 2;
                        continue;
                    }

                    // Success: read as text first so a truncated or non-JSON
                    // body shows up in the error message
                    let text = resp.text().map_err(|e| CliError {
                        code: exit_codes::EXIT_FETCH_UPSTREAM,
                        message: format!(
                            "failed to read {} response body: {}",
                            self.source_name, e,
                        ),
                        hint: None,
                    })?;
                    let trimmed = text.trim_start_matches('\u{feff}');
                    let body: serde_json::Value =
                        serde_json::from_str(trimmed).map_err(|e| CliError {
                            code: exit_codes::EXIT_FETCH_UPSTREAM,
                            message: format!(
                                "failed to parse {} JSON response: {} (body: {})",
                                self.source_name,
                                e,
                                &trimmed[..trimmed.len().min(200)],
                            ),
                            hint: None,
                        })?;

                    return Ok(Some(body));
                }
                Err(e) => {
                    // Network/timeout errors: retry
                    if attempt == MAX_RETRIES {
                        return Err(CliError {
                            code: exit_codes::EXIT_FETCH_UPSTREAM,
                            message: format!(
                                "{} upstream error after {} attempts: {}",
                                self.source_name, MAX_RETRIES, e,
                            ),
                            hint: None,
                        });
                    }

                    eprintln!(
                        "warning: retry {}/{} in {}s ({})",
                        attempt + 1,
                        MAX_RETRIES,
                        backoff_secs,
                        e,
                    );
                    thread::sleep(Duration::from_secs(backoff_secs));
                    backoff_secs *= 2;
                }
            }
        }

        unreachable!()
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Resolve an API key: flag value > environment variable > error.
pub(super) fn resolve_api_key(
    flag: Option<String>,
    source_name: &str,
    env_var: &str,
) -> Result<String, CliError> {
    if let Some(key) = flag {
        let trimmed = key.trim().to_string();
        if trimmed.is_empty() {
            return Err(CliError {
                code: exit_codes::EXIT_FETCH_NOT_AUTH,
                message: format!(
                    "missing {} API key (use --api-key or set {})",
                    source_name, env_var,
                ),
                hint: None,
            });
        }
        return Ok(trimmed);
    }

    if let Ok(key) = std::env::var(env_var) {
        let trimmed = key.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(trimmed);
        }
    }

    Err(CliError {
        code: exit_codes::EXIT_FETCH_NOT_AUTH,
        message: format!(
            "missing {} API key (use --api-key or set {})",
            source_name, env_var,
        ),
        hint: None,
    })
}

/// Write raw records as a pretty-printed JSON array (file or stdout).
/// Returns the output label for use in progress messages.
pub(super) fn write_json(
    records: &[serde_json::Value],
    out: &Option<PathBuf>,
) -> Result<String, CliError> {
    let out_label = out
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());

    let json = serde_json::to_string_pretty(records)
        .map_err(|e| CliError::io(format!("JSON write error: {}", e)))?;

    match out {
        Some(path) => std::fs::write(path, json + "\n").map_err(|e| {
            CliError::io(format!("cannot create {}: {}", path.display(), e))
        })?,
        None => println!("{json}"),
    }
    Ok(out_label)
}

/// Write churn rows to CSV (file or stdout). Returns the output label.
pub(super) fn write_churn_csv(
    rows: &[ChurnRow],
    out: &Option<PathBuf>,
) -> Result<String, CliError> {
    let out_label = out
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());

    let writer: Box<dyn Write> = match out {
        Some(path) => {
            let f = std::fs::File::create(path).map_err(|e| {
                CliError::io(format!("cannot create {}: {}", path.display(), e))
            })?;
            Box::new(std::io::BufWriter::new(f))
        }
        None => Box::new(std::io::BufWriter::new(std::io::stdout().lock())),
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    // Always write header, even with zero rows
    if rows.is_empty() {
        csv_writer
            .write_record(["person_record_id", "cancellation_requested_at"])
            .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    }

    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    }

    csv_writer
        .flush()
        .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    Ok(out_label)
}
