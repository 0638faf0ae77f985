//! Stderr summary for `qbook run`.
//!
//! The statement JSON on stdout is the machine-readable output; this module
//! renders the short human recap that goes to stderr so piping stdout stays
//! clean.

use quotabook_engine::model::{MonthlyStatement, RepStatement};

pub fn print_summary(statement: &MonthlyStatement, skipped_deals: usize, skipped_churn: usize) {
    for line in summary_lines(statement) {
        eprintln!("{line}");
    }
    if skipped_deals > 0 || skipped_churn > 0 {
        eprintln!("note: skipped {skipped_deals} deal rows and {skipped_churn} churn rows");
    }
}

fn summary_lines(statement: &MonthlyStatement) -> Vec<String> {
    let mut lines = Vec::with_capacity(statement.reps.len() + 3);
    lines.push(format!("{} statement", statement.meta.month_label));
    for rep in &statement.reps {
        lines.push(rep_line(rep));
    }

    let opt_outs: u32 = statement
        .reps
        .iter()
        .map(|r| match r {
            RepStatement::TieredRevenue(s) => s.opt_out_count,
            RepStatement::ThresholdActivity(_) => 0,
        })
        .sum();
    let t = &statement.totals;
    lines.push(format!(
        "  {:<10} net {:>14}  opt-outs {} ({})  commission {:>12}",
        "team",
        fmt_money_minor(t.net_revenue_minor),
        opt_outs,
        fmt_money_minor(t.opt_out_revenue_minor),
        fmt_money_minor(t.commission_minor),
    ));

    let audit = &statement.churn_audit;
    if audit.unattributed.count > 0 || audit.opt_out_unattributed.count > 0 {
        lines.push(format!(
            "  unattributed: {} churn events ({}), {} opt-outs ({})",
            audit.unattributed.count,
            fmt_money_minor(audit.unattributed.revenue_minor),
            audit.opt_out_unattributed.count,
            fmt_money_minor(audit.opt_out_unattributed.revenue_minor),
        ));
    }
    lines
}

fn rep_line(rep: &RepStatement) -> String {
    match rep {
        RepStatement::TieredRevenue(s) => format!(
            "  {:<10} net {:>14}  attainment {:>7}  commission {:>12}",
            s.display_name,
            fmt_money_minor(s.net_revenue_minor),
            fmt_pct(s.attainment),
            fmt_money_minor(s.commission_minor),
        ),
        RepStatement::ThresholdActivity(s) => format!(
            "  {:<10} meetings {:>10}  attainment {:>7}  commission {:>12}",
            s.display_name,
            s.net_meetings,
            fmt_pct(s.attainment),
            fmt_money_minor(s.commission_minor),
        ),
    }
}

fn fmt_pct(attainment: f64) -> String {
    format!("{:.1}%", attainment * 100.0)
}

/// Render minor units as dollars: `123456` becomes `$1,234.56`.
pub fn fmt_money_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let units = (abs / 100).to_string();
    let cents = abs % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{cents:02}")
}
