//! `qbook fetch` — pull CRM data into the engine's input files.
//!
//! `fetch deals` writes the raw record JSON the normalizer consumes;
//! `fetch churn` flattens list entries into the two-column churn CSV.

mod attio;
mod common;

use std::path::PathBuf;

use clap::Subcommand;

use crate::CliError;

#[derive(Subcommand)]
pub enum FetchCommands {
    /// Fetch deal records from Attio
    #[command(after_help = "Examples:
  qbook fetch deals --out deals.json
  qbook fetch deals --stage 'Closed Won' --stage Live --out deals.json
  qbook fetch deals --object opportunities --stage-attr deal_stage --out deals.json

The API key comes from --api-key or the ATTIO_API_KEY environment variable.")]
    Deals {
        /// Stage labels to pull, repeatable (default: Closed Won, Closed Lost)
        #[arg(long)]
        stage: Vec<String>,

        /// Attio object slug holding deal records
        #[arg(long, default_value = "deals")]
        object: String,

        /// Attribute slug the stage filter matches against
        #[arg(long, default_value = "stage")]
        stage_attr: String,

        /// Attio API key (default: ATTIO_API_KEY environment variable)
        #[arg(long)]
        api_key: Option<String>,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Suppress progress output
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Fetch churned-customer entries from an Attio list
    #[command(after_help = "Examples:
  qbook fetch churn --out churn.csv
  qbook fetch churn --list churned_accounts --cancel-attr cancelled_on --out churn.csv

The API key comes from --api-key or the ATTIO_API_KEY environment variable.")]
    Churn {
        /// Attio list slug tracking churned people
        #[arg(long, default_value = "churned_customers")]
        list: String,

        /// Entry attribute carrying the cancellation date
        #[arg(long, default_value = "cancellation_requested_at")]
        cancel_attr: String,

        /// Attio API key (default: ATTIO_API_KEY environment variable)
        #[arg(long)]
        api_key: Option<String>,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Suppress progress output
        #[arg(long, short = 'q')]
        quiet: bool,
    },
}

pub fn cmd_fetch(command: FetchCommands) -> Result<(), CliError> {
    match command {
        FetchCommands::Deals {
            stage,
            object,
            stage_attr,
            api_key,
            out,
            quiet,
        } => attio::cmd_deals(stage, object, stage_attr, api_key, out, quiet),
        FetchCommands::Churn {
            list,
            cancel_attr,
            api_key,
            out,
            quiet,
        } => attio::cmd_churn(list, cancel_attr, api_key, out, quiet),
    }
}
