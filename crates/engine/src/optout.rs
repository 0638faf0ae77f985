use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Days, NaiveDate};

use crate::model::{ChurnEvent, Deal, DebitBucket};
use crate::month::MonthWindow;

// ---------------------------------------------------------------------------
// Opt-out reconciliation
// ---------------------------------------------------------------------------

/// A customer may cancel within this many days of signing and the deal is
/// treated as never commissionable.
pub const OPT_OUT_WINDOW_DAYS: u64 = 30;

#[derive(Debug, Clone, Default)]
pub struct OptOutOutcome {
    pub by_rep: BTreeMap<String, DebitBucket>,
    pub unattributed: DebitBucket,
}

/// Claw back deals whose customer opted out inside the correlation window.
///
/// Runs one month in arrears: for report month M this evaluates won deals
/// settled in M-1, whose 30-day windows have all elapsed by the time M is
/// reported, and the deduction lands on M's statement. Numbers for a given
/// month therefore stop moving days after that month closes instead of
/// drifting while it is still open.
///
/// A deal is an opt-out when any linked person cancelled between the deal's
/// anchor date and anchor plus [`OPT_OUT_WINDOW_DAYS`], both ends
/// inclusive. Each flagged deal deducts once, however many linked people
/// cancelled.
pub fn reconcile_opt_outs(
    churned: &[ChurnEvent],
    window: &MonthWindow,
    deals: &[Deal],
    won_label: &str,
    owner_map: &HashMap<String, String>,
    active_rep_ids: &HashSet<String>,
) -> OptOutOutcome {
    let lag = window.prior();

    // Earliest cancellation per person, matching the churn attributor.
    let mut cancel_dates: HashMap<&str, NaiveDate> = HashMap::new();
    for event in churned {
        cancel_dates
            .entry(event.person_record_id.as_str())
            .and_modify(|d| *d = (*d).min(event.cancelled_on))
            .or_insert(event.cancelled_on);
    }

    let mut outcome = OptOutOutcome::default();
    for deal in deals {
        if deal.stage.as_deref() != Some(won_label) {
            continue;
        }
        let Some(settled) = deal.settlement_date() else { continue };
        if !lag.contains(settled) {
            continue;
        }
        let Some(anchor) = deal.opt_out_anchor() else { continue };
        let Some(deadline) = anchor.checked_add_days(Days::new(OPT_OUT_WINDOW_DAYS)) else {
            continue;
        };
        let opted_out = deal.linked_person_ids.iter().any(|person| {
            cancel_dates
                .get(person.as_str())
                .is_some_and(|c| anchor <= *c && *c <= deadline)
        });
        if !opted_out {
            continue;
        }
        let rep_id = deal
            .owner_id
            .as_deref()
            .and_then(|o| owner_map.get(o))
            .filter(|rep| active_rep_ids.contains(*rep));
        match rep_id {
            Some(rep) => outcome.by_rep.entry(rep.clone()).or_default().add(deal.value_minor),
            None => outcome.unattributed.add(deal.value_minor),
        }
    }
    outcome
}
