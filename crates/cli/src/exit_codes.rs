//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, bad month)    |
//! | 3       | Universal        | IO error (unreadable/unwritable file)    |
//! | 10-19   | book             | Book configuration codes                 |
//! | 50-59   | fetch            | CRM connector codes                      |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, invalid month key, month before origin.
pub const EXIT_USAGE: u8 = 2;

/// IO error - input file unreadable or output file unwritable.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// Book configuration (10-19)
// =============================================================================

/// Book TOML failed to parse or validate (duplicate rep, bad tier table,
/// non-positive quota).
pub const EXIT_BOOK_CONFIG: u8 = 10;

/// Input records are malformed (deals JSON undeserializable, churn CSV
/// missing a required column).
pub const EXIT_INPUT: u8 = 11;

// =============================================================================
// Fetch (50-59)
// =============================================================================

/// No API key provided (flag or environment).
pub const EXIT_FETCH_NOT_AUTH: u8 = 50;

/// Upstream rejected the credentials (401/403).
pub const EXIT_FETCH_AUTH: u8 = 51;

/// Upstream rejected the request shape (400) or the object slug (404).
pub const EXIT_FETCH_VALIDATION: u8 = 52;

/// Rate limited (429) and retries exhausted.
pub const EXIT_FETCH_RATE_LIMIT: u8 = 53;

/// Upstream failure (5xx, network error, malformed response) after retries.
pub const EXIT_FETCH_UPSTREAM: u8 = 54;
