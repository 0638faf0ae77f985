use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate};

use crate::aggregate::{aggregate_stage, count_meetings};
use crate::churn::attribute_churn;
use crate::commission::{threshold_activity_commission, tiered_revenue_commission};
use crate::config::{BookConfig, CompPlan};
use crate::error::EngineError;
use crate::model::{
    ActivityStatement, Attribution, ChurnAudit, ChurnEvent, Deal, MonthlyStatement,
    RepStatement, RevenueStatement, StageTotals, StatementMeta, TeamTotals,
};
use crate::month::MonthWindow;
use crate::optout::reconcile_opt_outs;

// ---------------------------------------------------------------------------
// Engine input
// ---------------------------------------------------------------------------

/// Pre-loaded records plus the caller's notion of "today".
///
/// `as_of` only feeds the stale-month warning; the engine itself never
/// reads the clock, so the same input always produces the same statement.
#[derive(Debug, Clone)]
pub struct EngineInput {
    pub deals: Vec<Deal>,
    pub churned: Vec<ChurnEvent>,
    pub as_of: NaiveDate,
}

/// Days into a month after which an empty result looks like a
/// misconfigured attribute mapping rather than a quiet start.
const EMPTY_MONTH_GRACE_DAYS: u32 = 5;

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Compute one month's statement.
///
/// Every rep on the month's roster appears in the output even with nothing
/// attributed; absence means "not on the roster", never "no activity".
pub fn run(
    config: &BookConfig,
    window: &MonthWindow,
    input: &EngineInput,
) -> Result<MonthlyStatement, EngineError> {
    let month_key = window.key();
    let roster = config.active_reps(&month_key);
    let owner_map = config.owner_map();
    let lead_map = config.lead_owner_map();
    let active_ids: HashSet<String> = roster.iter().map(|r| r.id.clone()).collect();
    let won_label = config.stages.won.as_str();
    let lost_label = config.stages.lost.as_str();

    let won = aggregate_stage(&input.deals, window, &owner_map, won_label);
    let lost = aggregate_stage(&input.deals, window, &owner_map, lost_label);
    let meetings = count_meetings(&input.deals, window, &lead_map, won_label);
    let churn = attribute_churn(
        &input.churned,
        window,
        &input.deals,
        won_label,
        &owner_map,
        &active_ids,
    );
    let opt_out = reconcile_opt_outs(
        &input.churned,
        window,
        &input.deals,
        won_label,
        &owner_map,
        &active_ids,
    );

    let mut pipeline_by_stage: BTreeMap<String, BTreeMap<String, StageTotals>> = BTreeMap::new();
    for stage in &config.stages.tracked {
        pipeline_by_stage.insert(
            stage.clone(),
            aggregate_stage(&input.deals, window, &owner_map, stage),
        );
    }

    let mut reps = Vec::with_capacity(roster.len());
    let mut totals = TeamTotals::default();
    for rep in &roster {
        let mut attr = Attribution::default();
        if let Some(t) = won.get(&rep.id) {
            attr.gross_revenue_minor = t.revenue_minor;
            attr.deals_won = t.deal_count;
        }
        if let Some(t) = lost.get(&rep.id) {
            attr.deals_lost = t.deal_count;
        }
        if let Some(b) = churn.by_rep.get(&rep.id) {
            attr.churn_debit_revenue_minor = b.revenue_minor;
            attr.churn_debit_count = b.count;
        }
        if let Some(b) = opt_out.by_rep.get(&rep.id) {
            attr.opt_out_revenue_minor = b.revenue_minor;
            attr.opt_out_count = b.count;
        }

        let statement = match &rep.plan {
            CompPlan::TieredRevenue { quota_minor, tiers } => {
                let outcome = tiered_revenue_commission(
                    &rep.id,
                    *quota_minor,
                    tiers,
                    attr.net_revenue_minor(),
                )?;
                RepStatement::TieredRevenue(RevenueStatement {
                    rep_id: rep.id.clone(),
                    display_name: rep.name.clone(),
                    gross_revenue_minor: attr.gross_revenue_minor,
                    opt_out_revenue_minor: attr.opt_out_revenue_minor,
                    opt_out_count: attr.opt_out_count,
                    net_revenue_minor: attr.net_revenue_minor(),
                    deals_won: attr.deals_won,
                    deals_lost: attr.deals_lost,
                    win_rate: win_rate(attr.deals_won, attr.deals_lost),
                    churn_debit_revenue_minor: attr.churn_debit_revenue_minor,
                    churn_debit_count: attr.churn_debit_count,
                    attainment: outcome.attainment,
                    commission_minor: outcome.commission_minor,
                    tier_breakdown: outcome.breakdown,
                    pipeline: pipeline_for(&rep.id, &pipeline_by_stage),
                })
            }
            CompPlan::ThresholdActivity {
                quota_meetings,
                flat_rate_minor,
                accelerated_rate_minor,
                accelerator_threshold,
            } => {
                let net_meetings = meetings.get(&rep.id).copied().unwrap_or(0);
                let outcome = threshold_activity_commission(
                    &rep.id,
                    *quota_meetings,
                    *flat_rate_minor,
                    *accelerated_rate_minor,
                    *accelerator_threshold,
                    net_meetings,
                )?;
                RepStatement::ThresholdActivity(ActivityStatement {
                    rep_id: rep.id.clone(),
                    display_name: rep.name.clone(),
                    net_meetings,
                    attainment: outcome.attainment,
                    commission_minor: outcome.commission_minor,
                })
            }
        };

        totals.gross_revenue_minor += attr.gross_revenue_minor;
        totals.opt_out_revenue_minor += attr.opt_out_revenue_minor;
        totals.net_revenue_minor += attr.net_revenue_minor();
        totals.commission_minor += statement.commission_minor();
        totals.deals_won += attr.deals_won;
        totals.deals_lost += attr.deals_lost;
        reps.push(statement);
    }

    // Counts every won deal in the window, mapped owner or not, so a
    // mapping mistake does not masquerade as an empty month.
    let won_in_window = input
        .deals
        .iter()
        .filter(|d| d.stage.as_deref() == Some(won_label))
        .filter_map(|d| d.settlement_date())
        .filter(|settled| window.contains(*settled))
        .count();

    Ok(MonthlyStatement {
        meta: StatementMeta {
            month_key,
            month_label: window.label(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            warning: stale_month_warning(window, input.as_of, won_in_window),
        },
        reps,
        churn_audit: ChurnAudit {
            by_rep: churn.by_rep,
            unattributed: churn.unattributed,
            opt_out_unattributed: opt_out.unattributed,
        },
        totals,
    })
}

fn win_rate(won: u32, lost: u32) -> Option<f64> {
    let total = won + lost;
    (total > 0).then(|| won as f64 / total as f64)
}

fn pipeline_for(
    rep_id: &str,
    by_stage: &BTreeMap<String, BTreeMap<String, StageTotals>>,
) -> BTreeMap<String, StageTotals> {
    by_stage
        .iter()
        .map(|(stage, totals)| {
            (stage.clone(), totals.get(rep_id).copied().unwrap_or_default())
        })
        .collect()
}

fn stale_month_warning(
    window: &MonthWindow,
    as_of: NaiveDate,
    won_in_window: usize,
) -> Option<String> {
    if won_in_window > 0 {
        return None;
    }
    let closed_month = as_of > window.end;
    let stale_current = window.contains(as_of) && as_of.day() > EMPTY_MONTH_GRACE_DAYS;
    (closed_month || stale_current).then(|| {
        format!(
            "no closed-won deals found for {}; check attribute mapping or date range",
            window.label()
        )
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
