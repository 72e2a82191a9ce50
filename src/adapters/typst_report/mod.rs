//! Typst tear-sheet report generation.
//!
//! Orchestrates placeholder resolution: reads a Typst template (either the
//! built-in default or a custom file via `template_path`), resolves all
//! `{{PLACEHOLDER}}` markers by calling helpers from `chart_svg` and `tables`,
//! and writes the final `.typ` file.

pub mod chart_svg;
pub mod default_template;
pub mod tables;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::info;

use crate::domain::error::AlphalabError;
use crate::domain::factor::TearSheet;
use crate::ports::report_port::{ReportPort, ReportSummary};
use chart_svg::LineSeries;

/// Context for resolving template placeholders.
pub struct ReportContext<'a> {
    pub sheet: &'a TearSheet,
    pub summary: &'a ReportSummary,
    pub generated: String,
}

/// Resolve all `{{PLACEHOLDER}}`s in the given template string and return
/// the final Typst markup ready to be written to a `.typ` file.
pub fn resolve(template: &str, ctx: &ReportContext) -> String {
    let sheet = ctx.sheet;
    let mut output = template.to_string();

    output = output.replace("{{TITLE}}", &ctx.summary.title);
    output = output.replace("{{GENERATED}}", &ctx.generated);
    output = output.replace("{{SUMMARY_TABLE}}", &tables::format_summary(ctx.summary, sheet));
    output = output.replace("{{QUANTILE_STATS}}", &tables::format_quantile_stats(sheet));
    output = output.replace("{{RETURNS_TABLE}}", &tables::format_returns_table(sheet));
    output = output.replace("{{IC_TABLE}}", &tables::format_ic_table(sheet));
    output = output.replace("{{TURNOVER_TABLE}}", &tables::format_turnover_table(sheet));

    // Mean return of the first period per quantile
    let labels: Vec<String> = (1..=sheet.mean_return_by_quantile.len())
        .map(|q| q.to_string())
        .collect();
    let first_period: Vec<f64> = sheet
        .mean_return_by_quantile
        .iter()
        .map(|row| row.first().map_or(f64::NAN, |r| r.mean))
        .collect();
    let period = sheet.periods.first().copied().unwrap_or(1);
    let bars = chart_svg::bar_chart_svg(
        &format!("Mean {}D return by quantile", period),
        &labels,
        &first_period,
    );
    output = output.replace(
        "{{QUANTILE_RETURNS_CHART}}",
        &chart_svg::embed(&bars, "No quantile return data."),
    );

    let cumulative = chart_svg::line_chart_svg(
        &format!("Factor-weighted cumulative {}D return", period),
        &[LineSeries {
            label: "factor".into(),
            points: &sheet.cumulative_factor_returns,
        }],
        true,
    );
    output = output.replace(
        "{{CUMULATIVE_RETURNS_CHART}}",
        &chart_svg::embed(&cumulative, "No factor return data."),
    );

    let by_quantile: Vec<LineSeries> = sheet
        .cumulative_by_quantile
        .iter()
        .enumerate()
        .map(|(i, points)| LineSeries {
            label: format!("Q{}", i + 1),
            points,
        })
        .collect();
    let quantile_chart = chart_svg::line_chart_svg(
        &format!("Cumulative {}D return by quantile", period),
        &by_quantile,
        true,
    );
    output = output.replace(
        "{{QUANTILE_CUMULATIVE_CHART}}",
        &chart_svg::embed(&quantile_chart, "No quantile return data."),
    );

    let rolling: Vec<(NaiveDateTime, f64)> = ctx
        .summary
        .rolling_ic
        .iter()
        .map(|(d, v)| (d.and_time(chrono::NaiveTime::MIN), *v))
        .collect();
    let rolling_chart = chart_svg::line_chart_svg(
        "Rolling daily IC",
        &[LineSeries {
            label: "IC".into(),
            points: &rolling,
        }],
        false,
    );
    output = output.replace(
        "{{ROLLING_IC_CHART}}",
        &chart_svg::embed(&rolling_chart, "No daily IC data."),
    );

    let monthly = tables::compute_monthly_ic(&ctx.summary.rolling_ic);
    output = output.replace("{{IC_HEATMAP}}", &tables::format_ic_heatmap(&monthly));

    output
}

/// Writes tear sheets as Typst source.
pub struct TypstReportAdapter {
    template_path: Option<PathBuf>,
}

impl TypstReportAdapter {
    pub fn new(template_path: Option<PathBuf>) -> Self {
        Self { template_path }
    }

    fn load_template(&self) -> Result<String, AlphalabError> {
        match &self.template_path {
            Some(path) => Ok(fs::read_to_string(path)?),
            None => Ok(default_template::template().to_string()),
        }
    }
}

impl ReportPort for TypstReportAdapter {
    fn write(
        &self,
        sheet: &TearSheet,
        summary: &ReportSummary,
        output_path: &Path,
    ) -> Result<(), AlphalabError> {
        let template = self.load_template()?;
        let ctx = ReportContext {
            sheet,
            summary,
            generated: chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        };
        let markup = resolve(&template, &ctx);
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, markup)?;
        info!(path = %output_path.display(), "wrote tear sheet");
        Ok(())
    }
}
