//! Report generation port trait.

use std::path::Path;

use crate::domain::error::AlphalabError;
use crate::domain::factor::TearSheet;

/// Selection results shown alongside the tear sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSummary {
    pub title: String,
    pub lookahead: usize,
    pub model_keys: Vec<String>,
    /// `(date, rolling IC)`
    pub rolling_ic: Vec<(chrono::NaiveDate, f64)>,
    pub ic_mean: Option<f64>,
    pub ic_median: Option<f64>,
}

/// Port for writing factor tear-sheet reports.
pub trait ReportPort {
    fn write(
        &self,
        sheet: &TearSheet,
        summary: &ReportSummary,
        output_path: &Path,
    ) -> Result<(), AlphalabError>;
}
