use std::collections::{BTreeMap, HashMap};

use crate::model::{Deal, StageTotals};
use crate::month::MonthWindow;

// ---------------------------------------------------------------------------
// Stage aggregation
// ---------------------------------------------------------------------------

/// Per-rep deal totals for one stage label within one month.
///
/// Shared by gross (won), lost, and pipeline aggregation so every figure on
/// a statement uses the same settlement-date and owner-resolution rules.
/// Deals with no settlement date or an owner outside the roster are
/// skipped, never errors; the unmapped slice is visible through team-level
/// counts instead.
pub fn aggregate_stage(
    deals: &[Deal],
    window: &MonthWindow,
    owner_map: &HashMap<String, String>,
    stage_label: &str,
) -> BTreeMap<String, StageTotals> {
    let mut totals: BTreeMap<String, StageTotals> = BTreeMap::new();
    for deal in deals {
        if deal.stage.as_deref() != Some(stage_label) {
            continue;
        }
        let Some(settled) = deal.settlement_date() else { continue };
        if !window.contains(settled) {
            continue;
        }
        let Some(rep_id) = deal.owner_id.as_deref().and_then(|o| owner_map.get(o)) else {
            continue;
        };
        let entry = totals.entry(rep_id.clone()).or_default();
        entry.deal_count += 1;
        entry.revenue_minor += deal.value_minor;
    }
    totals
}

/// Won deals in the window credited to meeting-setters via the lead-owner
/// attribute. Counts only; meeting deals carry no commissionable value for
/// the setter.
pub fn count_meetings(
    deals: &[Deal],
    window: &MonthWindow,
    lead_map: &HashMap<String, String>,
    won_label: &str,
) -> BTreeMap<String, u32> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for deal in deals {
        if deal.stage.as_deref() != Some(won_label) {
            continue;
        }
        let Some(settled) = deal.settlement_date() else { continue };
        if !window.contains(settled) {
            continue;
        }
        let Some(rep_id) = deal.lead_owner_id.as_deref().and_then(|l| lead_map.get(l)) else {
            continue;
        };
        *counts.entry(rep_id.clone()).or_default() += 1;
    }
    counts
}
