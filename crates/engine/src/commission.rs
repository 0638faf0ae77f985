//! Commission calculators.
//!
//! Pure functions over minor units. The only error path is a negative
//! quota, which is a configuration defect and must fail loudly rather than
//! produce plausible-looking numbers.

use crate::config::TierConfig;
use crate::error::EngineError;
use crate::model::TierLine;

// ---------------------------------------------------------------------------
// Tiered revenue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TierOutcome {
    pub attainment: f64,
    pub commission_minor: i64,
    pub breakdown: Vec<TierLine>,
}

/// Progressive commission over attainment bands.
///
/// Each band pays its own rate on the quota dollars inside it; crossing a
/// boundary never reprices earlier dollars. Bands round to the nearest
/// minor unit individually and the total is the exact sum of the rounded
/// bands, so a rendered breakdown always adds up.
pub fn tiered_revenue_commission(
    rep: &str,
    quota_minor: i64,
    tiers: &[TierConfig],
    net_revenue_minor: i64,
) -> Result<TierOutcome, EngineError> {
    if quota_minor < 0 {
        return Err(EngineError::InvalidQuota { rep: rep.to_string(), quota: quota_minor });
    }
    let attainment = if quota_minor == 0 {
        0.0
    } else {
        net_revenue_minor as f64 / quota_minor as f64
    };

    let mut commission_minor = 0_i64;
    let mut breakdown = Vec::with_capacity(tiers.len());
    let mut lower = 0.0_f64;
    for tier in tiers {
        let ceiling = tier.ceiling.unwrap_or(f64::INFINITY);
        let paid_minor = if attainment <= lower {
            0
        } else {
            let span = attainment.min(ceiling) - lower;
            (span * quota_minor as f64 * tier.rate).round() as i64
        };
        commission_minor += paid_minor;
        breakdown.push(TierLine {
            lower_bound: lower,
            ceiling: tier.ceiling,
            rate: tier.rate,
            commission_minor: paid_minor,
        });
        lower = ceiling;
    }
    Ok(TierOutcome { attainment, commission_minor, breakdown })
}

// ---------------------------------------------------------------------------
// Threshold activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ActivityOutcome {
    pub attainment: f64,
    pub commission_minor: i64,
}

/// Per-meeting commission with an accelerator.
///
/// At or below the threshold every meeting pays the flat rate. Above it,
/// the base count is fixed at `floor(quota * threshold)` meetings at the
/// flat rate and only meetings beyond the base pay the accelerated rate.
pub fn threshold_activity_commission(
    rep: &str,
    quota_meetings: i64,
    flat_rate_minor: i64,
    accelerated_rate_minor: i64,
    accelerator_threshold: f64,
    net_meetings: u32,
) -> Result<ActivityOutcome, EngineError> {
    if quota_meetings < 0 {
        return Err(EngineError::InvalidQuota { rep: rep.to_string(), quota: quota_meetings });
    }
    let meetings = net_meetings as i64;
    let attainment = if quota_meetings == 0 {
        0.0
    } else {
        meetings as f64 / quota_meetings as f64
    };

    let commission_minor = if attainment <= accelerator_threshold {
        meetings * flat_rate_minor
    } else {
        let base = ((quota_meetings as f64 * accelerator_threshold).floor() as i64)
            .clamp(0, meetings);
        base * flat_rate_minor + (meetings - base) * accelerated_rate_minor
    };
    Ok(ActivityOutcome { attainment, commission_minor })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
