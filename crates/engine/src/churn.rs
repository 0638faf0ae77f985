use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;

use crate::model::{ChurnEvent, Deal, DebitBucket};
use crate::month::MonthWindow;

// ---------------------------------------------------------------------------
// Churn attribution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ChurnOutcome {
    pub by_rep: BTreeMap<String, DebitBucket>,
    pub unattributed: DebitBucket,
}

/// Attribute the month's cancellations back to the reps who sold the
/// churned customers.
///
/// The reverse index spans the entire deal history, not just the reporting
/// window: a customer sold in January can cancel in June and the debit
/// still finds its seller. Each person contributes at most one debit per
/// month no matter how many churn rows or linked deals they have; when
/// several won deals link the same person, the latest settled one carries
/// the debit. Events that resolve to no deal, no roster owner, or an
/// inactive rep land in `unattributed` rather than disappearing.
pub fn attribute_churn(
    churned: &[ChurnEvent],
    window: &MonthWindow,
    deals: &[Deal],
    won_label: &str,
    owner_map: &HashMap<String, String>,
    active_rep_ids: &HashSet<String>,
) -> ChurnOutcome {
    let mut by_person: HashMap<&str, Vec<&Deal>> = HashMap::new();
    for deal in deals {
        if deal.stage.as_deref() != Some(won_label) {
            continue;
        }
        for person in &deal.linked_person_ids {
            by_person.entry(person.as_str()).or_default().push(deal);
        }
    }

    // Earliest cancellation per person; duplicate exports are common.
    let mut cancel_dates: BTreeMap<&str, NaiveDate> = BTreeMap::new();
    for event in churned {
        cancel_dates
            .entry(event.person_record_id.as_str())
            .and_modify(|d| *d = (*d).min(event.cancelled_on))
            .or_insert(event.cancelled_on);
    }

    let mut outcome = ChurnOutcome::default();
    for (person, cancelled_on) in cancel_dates {
        if !window.contains(cancelled_on) {
            continue;
        }
        let Some(linked) = by_person.get(person) else {
            outcome.unattributed.add(0);
            continue;
        };
        let deal = linked
            .iter()
            .max_by_key(|d| (d.settlement_date(), d.id.as_str()))
            .copied()
            .expect("reverse index entries are non-empty");
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
