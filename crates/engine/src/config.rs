use std::collections::HashMap;

use serde::Deserialize;

use crate::error::EngineError;
use crate::month::MonthWindow;

// ---------------------------------------------------------------------------
// Book configuration
// ---------------------------------------------------------------------------

/// A commission book: which CRM attributes feed the engine, which stage
/// labels matter, and the roster of reps with their compensation plans.
#[derive(Debug, Clone, Deserialize)]
pub struct BookConfig {
    pub book: BookSection,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub stages: StageLabels,
    #[serde(default)]
    pub churn_columns: ChurnColumns,
    pub reps: Vec<RepConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookSection {
    pub name: String,
    /// First month the book can report on, `YYYY-MM`.
    pub origin_month: String,
}

/// CRM attribute slugs. Workspaces rename attributes freely, so every slug
/// the engine reads is remappable here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttributeMap {
    pub stage: String,
    pub value: String,
    pub owner: String,
    pub close_date: String,
    pub onboarding_date: String,
    pub linked_people: String,
    pub lead_owner: String,
}

impl Default for AttributeMap {
    fn default() -> Self {
        AttributeMap {
            stage: "stage".into(),
            value: "value".into(),
            owner: "owner".into(),
            close_date: "close_date".into(),
            onboarding_date: "onboarding_date".into(),
            linked_people: "associated_people".into(),
            lead_owner: "lead_owner".into(),
        }
    }
}

/// Stage display labels. `tracked` drives the per-rep pipeline breakdown
/// and is ordered as configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StageLabels {
    pub won: String,
    pub lost: String,
    pub tracked: Vec<String>,
}

impl Default for StageLabels {
    fn default() -> Self {
        StageLabels {
            won: "Closed Won".into(),
            lost: "Closed Lost".into(),
            tracked: vec![
                "Introductory Call".into(),
                "To Be Onboarded".into(),
                "Live".into(),
                "Closed Won".into(),
                "Closed Lost".into(),
            ],
        }
    }
}

/// Column headers of the churn CSV.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChurnColumns {
    pub record_id: String,
    pub cancel_date: String,
}

impl Default for ChurnColumns {
    fn default() -> Self {
        ChurnColumns {
            record_id: "person_record_id".into(),
            cancel_date: "cancellation_requested_at".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reps and plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RepConfig {
    pub id: String,
    pub name: String,
    /// CRM owner actor ids that attribute deal revenue to this rep.
    #[serde(default)]
    pub owner_ids: Vec<String>,
    /// CRM actor ids whose sourced meetings credit this rep.
    #[serde(default)]
    pub lead_owner_ids: Vec<String>,
    /// First month the rep appears on statements, `YYYY-MM`, inclusive.
    #[serde(default)]
    pub active_from: Option<String>,
    /// Last month the rep appears on statements, `YYYY-MM`, inclusive.
    #[serde(default)]
    pub active_to: Option<String>,
    #[serde(flatten)]
    pub plan: CompPlan,
}

impl RepConfig {
    /// Roster membership for a month. Month keys are zero-padded so plain
    /// lexical comparison orders them correctly.
    pub fn is_active(&self, month_key: &str) -> bool {
        if let Some(from) = &self.active_from {
            if month_key < from.as_str() {
                return false;
            }
        }
        if let Some(to) = &self.active_to {
            if month_key > to.as_str() {
                return false;
            }
        }
        true
    }
}

/// A rep's compensation model.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CompPlan {
    /// Progressive rates over quota attainment bands, paid on net revenue.
    TieredRevenue {
        quota_minor: i64,
        tiers: Vec<TierConfig>,
    },
    /// Flat rate per meeting, accelerated past an attainment threshold.
    ThresholdActivity {
        quota_meetings: i64,
        flat_rate_minor: i64,
        accelerated_rate_minor: i64,
        accelerator_threshold: f64,
    },
}

/// One attainment band. `ceiling` is the band's upper attainment bound;
/// only the final tier may omit it, making that tier unbounded.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TierConfig {
    #[serde(default)]
    pub ceiling: Option<f64>,
    pub rate: f64,
}

// ---------------------------------------------------------------------------
// Parsing and validation
// ---------------------------------------------------------------------------

impl BookConfig {
    pub fn from_toml(data: &str) -> Result<Self, EngineError> {
        let config: BookConfig =
            toml::from_str(data).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::ConfigValidation(msg));

        if self.book.name.trim().is_empty() {
            return fail("book.name must not be empty".into());
        }
        MonthWindow::from_key(&self.book.origin_month)
            .map_err(|e| EngineError::ConfigValidation(format!("book.origin_month: {e}")))?;

        if self.reps.is_empty() {
            return fail("at least one [[reps]] entry is required".into());
        }

        let mut seen_ids: HashMap<&str, ()> = HashMap::new();
        let mut owner_bindings: HashMap<&str, &str> = HashMap::new();
        let mut lead_bindings: HashMap<&str, &str> = HashMap::new();

        for rep in &self.reps {
            if rep.id.trim().is_empty() {
                return fail("rep id must not be empty".into());
            }
            if rep.name.trim().is_empty() {
                return fail(format!("rep '{}': name must not be empty", rep.id));
            }
            if seen_ids.insert(&rep.id, ()).is_some() {
                return fail(format!("duplicate rep id '{}'", rep.id));
            }
            for owner in &rep.owner_ids {
                if let Some(other) = owner_bindings.insert(owner, &rep.id) {
                    return fail(format!(
                        "owner id '{owner}' is bound to both '{other}' and '{}'",
                        rep.id
                    ));
                }
            }
            for lead in &rep.lead_owner_ids {
                if let Some(other) = lead_bindings.insert(lead, &rep.id) {
                    return fail(format!(
                        "lead owner id '{lead}' is bound to both '{other}' and '{}'",
                        rep.id
                    ));
                }
            }
            for (field, key) in [("active_from", &rep.active_from), ("active_to", &rep.active_to)]
            {
                if let Some(key) = key {
                    MonthWindow::from_key(key).map_err(|e| {
                        EngineError::ConfigValidation(format!("rep '{}': {field}: {e}", rep.id))
                    })?;
                }
            }
            if let (Some(from), Some(to)) = (&rep.active_from, &rep.active_to) {
                if from > to {
                    return fail(format!(
                        "rep '{}': active_from {from} is after active_to {to}",
                        rep.id
                    ));
                }
            }
            validate_plan(&rep.id, &rep.plan)?;
        }
        Ok(())
    }

    /// Reps on the roster for a month, in configuration order.
    pub fn active_reps(&self, month_key: &str) -> Vec<&RepConfig> {
        self.reps.iter().filter(|r| r.is_active(month_key)).collect()
    }

    /// CRM owner id -> rep id, over the whole roster.
    pub fn owner_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for rep in &self.reps {
            for owner in &rep.owner_ids {
                map.insert(owner.clone(), rep.id.clone());
            }
        }
        map
    }

    /// CRM lead-owner id -> rep id, over the whole roster.
    pub fn lead_owner_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for rep in &self.reps {
            for lead in &rep.lead_owner_ids {
                map.insert(lead.clone(), rep.id.clone());
            }
        }
        map
    }
}

fn validate_plan(rep_id: &str, plan: &CompPlan) -> Result<(), EngineError> {
    let fail = |msg: String| Err(EngineError::ConfigValidation(msg));
    match plan {
        CompPlan::TieredRevenue { quota_minor, tiers } => {
            if *quota_minor <= 0 {
                return fail(format!(
                    "rep '{rep_id}': quota_minor must be positive, got {quota_minor}"
                ));
            }
            if tiers.is_empty() {
                return fail(format!("rep '{rep_id}': at least one tier is required"));
            }
            let mut prev_ceiling = 0.0_f64;
            for (i, tier) in tiers.iter().enumerate() {
                if tier.rate < 0.0 {
                    return fail(format!(
                        "rep '{rep_id}': tier {} rate must not be negative",
                        i + 1
                    ));
                }
                let last = i == tiers.len() - 1;
                match tier.ceiling {
                    Some(c) if last => {
                        return fail(format!(
                            "rep '{rep_id}': the last tier must omit ceiling, got {c}"
                        ));
                    }
                    Some(c) => {
                        if c <= prev_ceiling {
                            return fail(format!(
                                "rep '{rep_id}': tier {} ceiling {c} must exceed {prev_ceiling}",
                                i + 1
                            ));
                        }
                        prev_ceiling = c;
                    }
                    None if !last => {
                        return fail(format!(
                            "rep '{rep_id}': only the last tier may omit ceiling"
                        ));
                    }
                    None => {}
                }
            }
        }
        CompPlan::ThresholdActivity {
            quota_meetings,
            flat_rate_minor,
            accelerated_rate_minor,
            accelerator_threshold,
        } => {
            if *quota_meetings <= 0 {
                return fail(format!(
                    "rep '{rep_id}': quota_meetings must be positive, got {quota_meetings}"
                ));
            }
            if *flat_rate_minor < 0 || *accelerated_rate_minor < 0 {
                return fail(format!("rep '{rep_id}': rates must not be negative"));
            }
            if *accelerator_threshold < 0.0 {
                return fail(format!(
                    "rep '{rep_id}': accelerator_threshold must not be negative"
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_BOOK: &str = r#"
[book]
name = "Acme revenue book"
origin_month = "2025-11"

[stages]
won = "Closed Won"
lost = "Closed Lost"
tracked = ["Introductory Call", "Live", "Closed Won"]

[[reps]]
id = "jason"
name = "Jason"
owner_ids = ["own-jason"]
model = "tiered_revenue"
quota_minor = 10_000_000
tiers = [
    { ceiling = 1.0, rate = 0.09 },
    { ceiling = 1.2, rate = 0.11 },
    { rate = 0.13 },
]

[[reps]]
id = "max"
name = "Max"
lead_owner_ids = ["lead-max"]
active_from = "2026-01"
model = "threshold_activity"
quota_meetings = 15
flat_rate_minor = 3_300
accelerated_rate_minor = 4_000
accelerator_threshold = 1.25
"#;

    fn parse(data: &str) -> Result<BookConfig, EngineError> {
        BookConfig::from_toml(data)
    }

    #[test]
    fn parses_valid_book() {
        let config = parse(VALID_BOOK).unwrap();
        assert_eq!(config.book.name, "Acme revenue book");
        assert_eq!(config.reps.len(), 2);
        assert_eq!(config.attributes.stage, "stage");
        assert_eq!(config.stages.tracked.len(), 3);
        match &config.reps[0].plan {
            CompPlan::TieredRevenue { quota_minor, tiers } => {
                assert_eq!(*quota_minor, 10_000_000);
                assert_eq!(tiers.len(), 3);
                assert_eq!(tiers[2].ceiling, None);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
        match &config.reps[1].plan {
            CompPlan::ThresholdActivity { quota_meetings, .. } => {
                assert_eq!(*quota_meetings, 15);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let config = parse(VALID_BOOK).unwrap();
        assert_eq!(config.churn_columns.record_id, "person_record_id");
        assert_eq!(config.attributes.linked_people, "associated_people");
    }

    #[test]
    fn reject_duplicate_rep_id() {
        let data = VALID_BOOK.replace("id = \"max\"", "id = \"jason\"");
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("duplicate rep id 'jason'"), "{err}");
    }

    #[test]
    fn reject_owner_bound_twice() {
        let data = VALID_BOOK.replace(
            "lead_owner_ids = [\"lead-max\"]",
            "owner_ids = [\"own-jason\"]",
        );
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("bound to both"), "{err}");
    }

    #[test]
    fn reject_zero_quota() {
        let data = VALID_BOOK.replace("quota_minor = 10_000_000", "quota_minor = 0");
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("quota_minor must be positive"), "{err}");
    }

    #[test]
    fn reject_descending_ceilings() {
        let data = VALID_BOOK.replace("{ ceiling = 1.2, rate = 0.11 }", "{ ceiling = 0.8, rate = 0.11 }");
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("must exceed"), "{err}");
    }

    #[test]
    fn reject_bounded_last_tier() {
        let data = VALID_BOOK.replace("{ rate = 0.13 }", "{ ceiling = 2.0, rate = 0.13 }");
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("last tier must omit ceiling"), "{err}");
    }

    #[test]
    fn reject_bad_origin_month() {
        let data = VALID_BOOK.replace("origin_month = \"2025-11\"", "origin_month = \"2025-13\"");
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("origin_month"), "{err}");
    }

    #[test]
    fn reject_inverted_active_window() {
        let data = VALID_BOOK.replace(
            "active_from = \"2026-01\"",
            "active_from = \"2026-06\"\nactive_to = \"2026-02\"",
        );
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("is after active_to"), "{err}");
    }

    #[test]
    fn active_reps_respects_windows() {
        let config = parse(VALID_BOOK).unwrap();
        let december: Vec<&str> =
            config.active_reps("2025-12").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(december, vec!["jason"]);
        let january: Vec<&str> =
            config.active_reps("2026-01").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(january, vec!["jason", "max"]);
    }

    #[test]
    fn owner_maps_cover_roster() {
        let config = parse(VALID_BOOK).unwrap();
        assert_eq!(config.owner_map().get("own-jason").map(String::as_str), Some("jason"));
        assert_eq!(config.lead_owner_map().get("lead-max").map(String::as_str), Some("max"));
    }
}
