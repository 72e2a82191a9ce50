//! Table formatting for tear-sheet reports.
//!
//! Provides functions to generate Typst markup for:
//! - Selection summary (models, IC summary)
//! - Factor quantile statistics
//! - Mean return by quantile and top-minus-bottom spread
//! - Information coefficient statistics
//! - Mean quantile turnover
//! - Monthly mean IC heatmap

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::domain::factor::{Grouping, IcStats, TearSheet};
use crate::ports::report_port::ReportSummary;

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => "-".to_string(),
    }
}

fn fmt_bps(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}", value * 1e4)
    } else {
        "-".to_string()
    }
}

fn period_header(periods: &[usize]) -> String {
    periods
        .iter()
        .map(|p| format!("[*{}D*]", p))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_summary(summary: &ReportSummary, sheet: &TearSheet) -> String {
    let grouping = match sheet.grouping {
        Grouping::ByTimestamp => "per timestamp",
        Grouping::FullHistory => "full history",
    };
    let mut output = String::from("#table(\n  columns: 2,\n  [*Property*], [*Value*],\n");
    output.push_str(&format!("  [Lookahead], [{}],\n", summary.lookahead));
    output.push_str(&format!("  [Observations], [{}],\n", sheet.observations));
    output.push_str(&format!("  [Quantiles], [{} ({})],\n", sheet.quantiles, grouping));
    output.push_str(&format!(
        "  [Daily IC mean], [{}],\n",
        fmt_opt(summary.ic_mean, 4)
    ));
    output.push_str(&format!(
        "  [Daily IC median], [{}],\n",
        fmt_opt(summary.ic_median, 4)
    ));
    for (i, key) in summary.model_keys.iter().enumerate() {
        output.push_str(&format!("  [Model {}], [`{}`],\n", i + 1, key));
    }
    output.push_str(")\n\n");
    output
}

pub fn format_quantile_stats(sheet: &TearSheet) -> String {
    if sheet.quantile_stats.is_empty() {
        return "// No quantile data available\n".to_string();
    }
    let mut output = String::from("#table(\n  columns: 7,\n  align: right,\n");
    output.push_str("  [*Quantile*], [*Min*], [*Max*], [*Mean*], [*Std*], [*Count*], [*Count %*],\n");
    for q in &sheet.quantile_stats {
        output.push_str(&format!(
            "  [{}], [{}], [{}], [{}], [{}], [{}], [{:.2}%],\n",
            q.quantile,
            fmt_opt(Some(q.min), 6),
            fmt_opt(Some(q.max), 6),
            fmt_opt(Some(q.mean), 6),
            fmt_opt(Some(q.std), 6),
            q.count,
            q.pct
        ));
    }
    output.push_str(")\n\n");
    output
}

/// Mean per-bar demeaned return in basis points, one row per quantile plus
/// the spread.
pub fn format_returns_table(sheet: &TearSheet) -> String {
    if sheet.mean_return_by_quantile.is_empty() {
        return "// No returns data available\n".to_string();
    }
    let mut output = format!(
        "#table(\n  columns: {},\n  align: right,\n  [*Quantile*], {},\n",
        sheet.periods.len() + 1,
        period_header(&sheet.periods)
    );
    for (i, row) in sheet.mean_return_by_quantile.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|r| format!("[{}]", fmt_bps(r.mean))).collect();
        output.push_str(&format!("  [{}], {},\n", i + 1, cells.join(", ")));
    }
    let spread: Vec<String> = sheet
        .spread
        .iter()
        .map(|r| format!("[{} ± {}]", fmt_bps(r.mean), fmt_bps(r.std_err)))
        .collect();
    output.push_str(&format!("  [*Top − bottom*], {},\n", spread.join(", ")));
    output.push_str(")\n\n");
    output
}

pub fn format_ic_table(sheet: &TearSheet) -> String {
    if sheet.ic.is_empty() {
        return "// No IC data available\n".to_string();
    }
    let mut output = format!(
        "#table(\n  columns: {},\n  align: right,\n  [*Statistic*], {},\n",
        sheet.periods.len() + 1,
        period_header(&sheet.periods)
    );
    let rows: [(&str, fn(&IcStats) -> String); 6] = [
        ("IC mean", |s: &IcStats| fmt_opt(s.mean, 4)),
        ("IC std.", |s: &IcStats| fmt_opt(s.std, 4)),
        ("Risk-adjusted IC", |s: &IcStats| fmt_opt(s.risk_adjusted, 4)),
        ("t-stat", |s: &IcStats| fmt_opt(s.t_stat, 3)),
        ("p-value", |s: &IcStats| fmt_opt(s.p_value, 3)),
        ("Observations", |s: &IcStats| s.observations.to_string()),
    ];
    for (name, cell) in rows {
        let cells: Vec<String> = sheet.ic.iter().map(|s| format!("[{}]", cell(s))).collect();
        output.push_str(&format!("  [{}], {},\n", name, cells.join(", ")));
    }
    output.push_str(")\n\n");
    output
}

pub fn format_turnover_table(sheet: &TearSheet) -> String {
    if sheet.mean_turnover.is_empty() {
        return "// No turnover data available\n".to_string();
    }
    let mut output = format!(
        "#table(\n  columns: {},\n  align: right,\n  [*Quantile*], {},\n",
        sheet.periods.len() + 1,
        period_header(&sheet.periods)
    );
    for (i, row) in sheet.mean_turnover.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("[{}]", fmt_opt(*v, 3))).collect();
        output.push_str(&format!("  [{}], {},\n", i + 1, cells.join(", ")));
    }
    output.push_str(")\n\n");
    output
}

pub struct MonthlyIc {
    pub year: i32,
    pub month: u32,
    pub mean_ic: f64,
}

pub fn compute_monthly_ic(series: &[(NaiveDate, f64)]) -> Vec<MonthlyIc> {
    let mut by_month: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    for &(date, ic) in series.iter().filter(|(_, v)| v.is_finite()) {
        let entry = by_month.entry((date.year(), date.month())).or_insert((0.0, 0));
        entry.0 += ic;
        entry.1 += 1;
    }
    by_month
        .into_iter()
        .map(|((year, month), (sum, n))| MonthlyIc {
            year,
            month,
            mean_ic: sum / n as f64,
        })
        .collect()
}

pub fn format_ic_heatmap(monthly: &[MonthlyIc]) -> String {
    if monthly.is_empty() {
        return "// No IC data available\n".to_string();
    }

    let mut years: BTreeMap<i32, [Option<f64>; 12]> = BTreeMap::new();
    for m in monthly {
        years.entry(m.year).or_insert([None; 12])[(m.month - 1) as usize] = Some(m.mean_ic);
    }

    let mut output = String::new();
    output.push_str("#table(\n");
    output.push_str("  columns: 13,\n");
    output.push_str("  [*Year*], [*Jan*], [*Feb*], [*Mar*], [*Apr*], [*May*], [*Jun*], ");
    output.push_str("[*Jul*], [*Aug*], [*Sep*], [*Oct*], [*Nov*], [*Dec*],\n");
    for (year, months) in &years {
        output.push_str(&format!("  [{}],", year));
        for cell in months {
            match cell {
                Some(ic) => output.push_str(&format!(" {},", format_heatmap_cell(*ic))),
                None => output.push_str(" [-],"),
            }
        }
        output.push('\n');
    }
    output.push_str(")\n\n");
    output
}

/// Returns (fill_color, needs_white_text) for a given IC value.
fn ic_color(ic: f64) -> (&'static str, bool) {
    if ic >= 0.10 {
        ("rgb(\"#006400\")", true)
    } else if ic >= 0.05 {
        ("rgb(\"#228B22\")", true)
    } else if ic > 0.0 {
        ("rgb(\"#E0FFE0\")", false)
    } else if ic == 0.0 {
        ("rgb(\"#FFFFFF\")", false)
    } else if ic > -0.05 {
        ("rgb(\"#FFE0E0\")", false)
    } else if ic > -0.10 {
        ("rgb(\"#FF6060\")", true)
    } else {
        ("rgb(\"#8B0000\")", true)
    }
}

fn format_heatmap_cell(ic: f64) -> String {
    let (fill, white) = ic_color(ic);
    if white {
        format!("table.cell(fill: {}, text(fill: white)[{:.3}])", fill, ic)
    } else {
        format!("table.cell(fill: {})[{:.3}]", fill, ic)
    }
}
