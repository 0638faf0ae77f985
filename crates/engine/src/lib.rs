//! `quotabook-engine` — monthly sales-commission attribution and
//! reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded deal and churn records, returns a
//! per-representative monthly statement. No CLI or network dependencies.

pub mod aggregate;
pub mod churn;
pub mod commission;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod model;
pub mod month;
pub mod optout;
pub mod record;

pub use config::BookConfig;
pub use engine::{run, EngineInput};
pub use error::EngineError;
pub use model::{ChurnEvent, Deal, MonthlyStatement};
pub use month::MonthWindow;
