use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Normalized inputs
// ---------------------------------------------------------------------------

/// A deal after normalization. Monetary value is minor units; absent
/// attributes stay `None` rather than defaulting, so downstream stages can
/// tell "unset" from "zero".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub id: String,
    pub owner_id: Option<String>,
    pub stage: Option<String>,
    pub value_minor: i64,
    pub close_date: Option<NaiveDate>,
    pub onboarding_date: Option<NaiveDate>,
    pub linked_person_ids: Vec<String>,
    pub lead_owner_id: Option<String>,
}

impl Deal {
    /// The date that places a deal into a reporting month: onboarding when
    /// present, close date otherwise. A deal with neither never lands in
    /// any month.
    pub fn settlement_date(&self) -> Option<NaiveDate> {
        self.onboarding_date.or(self.close_date)
    }

    /// Anchor for the opt-out correlation window. Close date when present,
    /// onboarding date otherwise; precedence is deliberately the reverse of
    /// [`Deal::settlement_date`] because the cancellation window starts when
    /// the customer signed, not when they went live.
    pub fn opt_out_anchor(&self) -> Option<NaiveDate> {
        self.close_date.or(self.onboarding_date)
    }
}

/// A person's cancellation request, keyed by the CRM person record id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChurnEvent {
    pub person_record_id: String,
    pub cancelled_on: NaiveDate,
}

// ---------------------------------------------------------------------------
// Per-rep working state
// ---------------------------------------------------------------------------

/// Everything attributed to one rep for one month, before commission.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attribution {
    pub gross_revenue_minor: i64,
    pub churn_debit_revenue_minor: i64,
    pub churn_debit_count: u32,
    pub opt_out_revenue_minor: i64,
    pub opt_out_count: u32,
    pub deals_won: u32,
    pub deals_lost: u32,
}

impl Attribution {
    /// Commissionable revenue. Derived on read, never stored: only the
    /// opt-out bucket deducts, the churn debit is audit display.
    pub fn net_revenue_minor(&self) -> i64 {
        self.gross_revenue_minor - self.opt_out_revenue_minor
    }
}

/// A count/revenue pair used by both the churn-debit and opt-out buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DebitBucket {
    pub count: u32,
    pub revenue_minor: i64,
}

impl DebitBucket {
    pub fn add(&mut self, revenue_minor: i64) {
        self.count += 1;
        self.revenue_minor += revenue_minor;
    }
}

/// Deal count and summed value for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTotals {
    pub deal_count: u32,
    pub revenue_minor: i64,
}

// ---------------------------------------------------------------------------
// Statement output
// ---------------------------------------------------------------------------

/// One month's complete statement: every active rep, the churn audit, and
/// team totals. Serializes deterministically — map keys are `BTreeMap`s and
/// reps follow roster order.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyStatement {
    pub meta: StatementMeta,
    pub reps: Vec<RepStatement>,
    pub churn_audit: ChurnAudit,
    pub totals: TeamTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementMeta {
    pub month_key: String,
    pub month_label: String,
    pub engine_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Per-rep statement, shaped by the rep's compensation model.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum RepStatement {
    TieredRevenue(RevenueStatement),
    ThresholdActivity(ActivityStatement),
}

impl RepStatement {
    pub fn rep_id(&self) -> &str {
        match self {
            RepStatement::TieredRevenue(s) => &s.rep_id,
            RepStatement::ThresholdActivity(s) => &s.rep_id,
        }
    }

    pub fn commission_minor(&self) -> i64 {
        match self {
            RepStatement::TieredRevenue(s) => s.commission_minor,
            RepStatement::ThresholdActivity(s) => s.commission_minor,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueStatement {
    pub rep_id: String,
    pub display_name: String,
    pub gross_revenue_minor: i64,
    pub opt_out_revenue_minor: i64,
    pub opt_out_count: u32,
    pub net_revenue_minor: i64,
    pub deals_won: u32,
    pub deals_lost: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    pub churn_debit_revenue_minor: i64,
    pub churn_debit_count: u32,
    pub attainment: f64,
    pub commission_minor: i64,
    pub tier_breakdown: Vec<TierLine>,
    pub pipeline: BTreeMap<String, StageTotals>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityStatement {
    pub rep_id: String,
    pub display_name: String,
    pub net_meetings: u32,
    pub attainment: f64,
    pub commission_minor: i64,
}

/// One attainment band of a tiered plan and what it paid.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierLine {
    pub lower_bound: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<f64>,
    pub rate: f64,
    pub commission_minor: i64,
}

/// Where every cancellation landed. `unattributed` collects events whose
/// deal owner maps to no active rep (or no deal at all); nothing is
/// silently dropped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChurnAudit {
    pub by_rep: BTreeMap<String, DebitBucket>,
    pub unattributed: DebitBucket,
    pub opt_out_unattributed: DebitBucket,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TeamTotals {
    pub gross_revenue_minor: i64,
    pub opt_out_revenue_minor: i64,
    pub net_revenue_minor: i64,
    pub commission_minor: i64,
    pub deals_won: u32,
    pub deals_lost: u32,
}
