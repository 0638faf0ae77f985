use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (duplicate rep, bad tier table, etc.).
    ConfigValidation(String),
    /// Month key is not a valid `YYYY-MM` string.
    MonthKey(String),
    /// Missing required column in the churn CSV.
    MissingColumn { column: String },
    /// An input file could not be deserialized.
    RecordParse { path: String, msg: String },
    /// Attainment requested against a negative quota.
    InvalidQuota { rep: String, quota: i64 },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MonthKey(key) => write!(f, "invalid month key '{key}' (expected YYYY-MM)"),
            Self::MissingColumn { column } => {
                write!(f, "churn file: missing column '{column}'")
            }
            Self::RecordParse { path, msg } => write!(f, "{path}: {msg}"),
            Self::InvalidQuota { rep, quota } => {
                write!(f, "rep '{rep}': negative quota {quota}; refusing to compute attainment")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
