//! Feature and label engineering over a single symbol's bar history.
//!
//! The table is column-oriented: one timestamp per bar and one
//! `Vec<Option<f64>>` per feature, `None` marking warmup or undefined values.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::domain::dataset::Dataset;
use crate::domain::error::AlphalabError;
use crate::domain::indicator::bollinger::band_distances;
use crate::domain::indicator::{calculate_macd, calculate_ppo, calculate_rsi, IndicatorValue};
use crate::domain::indicator_helpers::{calc_atr, calc_natr, DEFAULT_ATR_PERIOD};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::stats;

pub const LABEL_MARKER: &str = "_fwd";

/// Parameters of the feature set. Defaults reproduce the research notebook.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    pub return_periods: Vec<usize>,
    pub forward_periods: Vec<usize>,
    pub dollar_volume_window: usize,
    pub rsi_period: usize,
    pub bollinger_period: usize,
    pub atr_period: usize,
    pub return_buckets: usize,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self {
            return_periods: vec![1, 5, 10, 21, 42, 63],
            forward_periods: vec![1, 5, 21],
            dollar_volume_window: 21,
            rsi_period: 14,
            bollinger_period: 20,
            atr_period: DEFAULT_ATR_PERIOD,
            return_buckets: 10,
        }
    }
}

impl FeatureSpec {
    /// Bars needed before every lagged feature is defined.
    pub fn warmup(&self) -> usize {
        let longest_return = self.return_periods.iter().copied().max().unwrap_or(0);
        longest_return
            .max(self.bollinger_period)
            .max(self.atr_period + 1)
            .max(26 + 9)
    }
}

pub fn return_column(period: usize) -> String {
    format!("r{:02}", period)
}

pub fn bucket_column(period: usize) -> String {
    format!("r{:02}dec", period)
}

pub fn label_column(period: usize) -> String {
    format!("r{:02}{}", period, LABEL_MARKER)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureTable {
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Self {
        Self {
            timestamps,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Add or replace a column. The column must have one value per row.
    pub fn insert(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), AlphalabError> {
        if values.len() != self.timestamps.len() {
            return Err(AlphalabError::DataFormat {
                source_name: "feature table".into(),
                reason: format!(
                    "column {} has {} values for {} rows",
                    name,
                    values.len(),
                    self.timestamps.len()
                ),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.values = values,
            None => self.columns.push(FeatureColumn {
                name: name.to_string(),
                values,
            }),
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Forward-return label columns, sorted.
    pub fn label_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.name.contains(LABEL_MARKER))
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every non-label column, sorted.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !c.name.contains(LABEL_MARKER))
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Rows whose calendar date falls in `[start, end]` (either bound optional).
    pub fn filter_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> FeatureTable {
        let keep: Vec<usize> = self
            .timestamps
            .iter()
            .enumerate()
            .filter(|(_, ts)| {
                let d = ts.date();
                start.is_none_or(|s| d >= s) && end.is_none_or(|e| d <= e)
            })
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&keep)
    }

    pub fn take_rows(&self, rows: &[usize]) -> FeatureTable {
        FeatureTable {
            timestamps: rows.iter().map(|&i| self.timestamps[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.clone(),
                    values: rows.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }

    /// Build a dataset from the rows where every feature and the label are present.
    pub fn select_complete(
        &self,
        features: &[String],
        label: &str,
    ) -> Result<Dataset, AlphalabError> {
        let feature_cols = features
            .iter()
            .map(|f| self.require(f))
            .collect::<Result<Vec<_>, _>>()?;
        let label_col = self.require(label)?;

        let mut timestamps = Vec::new();
        let mut rows = Vec::new();
        let mut targets = Vec::new();

        for i in 0..self.len() {
            let Some(target) = label_col[i] else { continue };
            let row: Option<Vec<f64>> = feature_cols.iter().map(|c| c[i]).collect();
            if let Some(row) = row {
                timestamps.push(self.timestamps[i]);
                rows.push(row);
                targets.push(target);
            }
        }

        Ok(Dataset {
            timestamps,
            feature_names: features.to_vec(),
            rows,
            targets,
        })
    }

    /// Feature values at `index`; missing values become NaN.
    pub fn feature_row(&self, index: usize, features: &[String]) -> Result<Vec<f64>, AlphalabError> {
        features
            .iter()
            .map(|f| {
                let col = self.require(f)?;
                Ok(col.get(index).copied().flatten().unwrap_or(f64::NAN))
            })
            .collect()
    }

    /// Feature values of the newest row.
    pub fn last_row(&self, features: &[String]) -> Result<Vec<f64>, AlphalabError> {
        let last = self.len().checked_sub(1).ok_or(AlphalabError::InsufficientData {
            what: "feature row".into(),
            have: 0,
            need: 1,
        })?;
        self.feature_row(last, features)
    }

    fn require(&self, name: &str) -> Result<&[Option<f64>], AlphalabError> {
        self.column(name).ok_or_else(|| AlphalabError::DataFormat {
            source_name: "feature table".into(),
            reason: format!("missing column {}", name),
        })
    }
}

/// Derive the full feature/label table from an ordered bar history.
pub fn build_feature_table(
    bars: &[OhlcvBar],
    spec: &FeatureSpec,
) -> Result<FeatureTable, AlphalabError> {
    let mut table = FeatureTable::new(bars.iter().map(|b| b.timestamp).collect());
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let dollar_vol: Vec<Option<f64>> = bars.iter().map(|b| Some(b.dollar_volume())).collect();
    let dollar_vol_ma = stats::rolling_mean(&dollar_vol, spec.dollar_volume_window, 1);
    table.insert("dollar_vol", dollar_vol)?;
    table.insert("dollar_vol_rank", stats::rank_options(&dollar_vol_ma, true))?;

    table.insert("rsi", calculate_rsi(bars, spec.rsi_period).simple_values())?;

    let (bb_high, bb_low) = band_distances(bars, spec.bollinger_period, 200);
    table.insert("bb_high", bb_high)?;
    table.insert("bb_low", bb_low)?;

    table.insert("NATR", calc_natr(bars, spec.atr_period).simple_values())?;
    table.insert(
        "ATR",
        stats::zscore(&calc_atr(bars, spec.atr_period).simple_values(), 1),
    )?;
    table.insert("PPO", calculate_ppo(bars, 12, 26).simple_values())?;

    let macd = calculate_macd(bars, 12, 26, 9).project(|v| match v {
        IndicatorValue::Macd { line, .. } => *line,
        _ => f64::NAN,
    });
    table.insert("MACD", stats::zscore(&macd, 0))?;

    for &t in &spec.return_periods {
        table.insert(&return_column(t), stats::pct_change(&closes, t))?;
    }
    for &t in &spec.return_periods {
        let buckets = stats::qcut(table.require(&return_column(t))?, spec.return_buckets);
        table.insert(
            &bucket_column(t),
            buckets.into_iter().map(|b| b.map(|x| x as f64)).collect(),
        )?;
    }
    for &t in &spec.forward_periods {
        let past = stats::pct_change(&closes, t);
        table.insert(&label_column(t), stats::shift_back(&past, t))?;
    }

    insert_calendar_columns(&mut table)?;
    Ok(table)
}

fn insert_calendar_columns(table: &mut FeatureTable) -> Result<(), AlphalabError> {
    let ts = table.timestamps.clone();
    table.insert("year", ts.iter().map(|t| Some(t.year() as f64)).collect())?;
    table.insert("month", ts.iter().map(|t| Some(t.month() as f64)).collect())?;
    table.insert("day", ts.iter().map(|t| Some(t.day() as f64)).collect())?;
    table.insert(
        "weekday",
        ts.iter()
            .map(|t| Some(t.weekday().num_days_from_monday() as f64))
            .collect(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::Duration;

    fn make_bars(n: usize) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1;
                OhlcvBar {
                    symbol: "BTCUSDT".into(),
                    timestamp: start + Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0 + i as f64,
                }
            })
            .collect()
    }

    #[test]
    fn builds_expected_columns() {
        let table = build_feature_table(&make_bars(120), &FeatureSpec::default()).unwrap();

        assert_eq!(
            table.label_names(),
            vec!["r01_fwd", "r05_fwd", "r21_fwd"]
        );
        let features = table.feature_names();
        for name in [
            "dollar_vol", "dollar_vol_rank", "rsi", "bb_high", "bb_low", "NATR", "ATR", "PPO",
            "MACD", "r01", "r63", "r01dec", "r63dec", "year", "month", "day", "weekday",
        ] {
            assert!(features.contains(&name.to_string()), "missing {}", name);
        }
        assert!(!features.iter().any(|f| f.contains("_fwd")));
    }

    #[test]
    fn forward_label_is_future_return() {
        let bars = make_bars(80);
        let table = build_feature_table(&bars, &FeatureSpec::default()).unwrap();

        let fwd = table.column("r05_fwd").unwrap();
        let expected = bars[15].close / bars[10].close - 1.0;
        assert_abs_diff_eq!(fwd[10].unwrap(), expected, epsilon = 1e-12);
        assert!(fwd[79].is_none());
        assert!(fwd[75].is_none());
        assert!(fwd[74].is_some());
    }

    #[test]
    fn lagged_returns_and_buckets_share_missing_rows() {
        let table = build_feature_table(&make_bars(100), &FeatureSpec::default()).unwrap();
        let r21 = table.column("r21").unwrap();
        let dec = table.column("r21dec").unwrap();
        assert!(r21[20].is_none());
        assert!(dec[20].is_none());
        assert!(r21[21].is_some());
        let bucket = dec[21].unwrap();
        assert!((0.0..10.0).contains(&bucket));
    }

    #[test]
    fn calendar_columns_follow_timestamps() {
        let table = build_feature_table(&make_bars(3), &FeatureSpec::default()).unwrap();
        // 2022-01-03 is a Monday
        assert_eq!(table.column("weekday").unwrap()[0], Some(0.0));
        assert_eq!(table.column("year").unwrap()[0], Some(2022.0));
        assert_eq!(table.column("day").unwrap()[2], Some(5.0));
    }

    #[test]
    fn dollar_volume_rank_is_descending() {
        let table = build_feature_table(&make_bars(30), &FeatureSpec::default()).unwrap();
        let rank = table.column("dollar_vol_rank").unwrap();
        assert!(rank.iter().all(Option::is_some));
        let max_rank = rank.iter().flatten().cloned().fold(f64::MIN, f64::max);
        assert!(max_rank <= 30.0);
    }

    #[test]
    fn select_complete_drops_incomplete_rows() {
        let bars = make_bars(150);
        let table = build_feature_table(&bars, &FeatureSpec::default()).unwrap();
        let features = table.feature_names();
        let ds = table.select_complete(&features, "r01_fwd").unwrap();

        assert!(!ds.is_empty());
        assert!(ds.len() < bars.len());
        assert_eq!(ds.num_features(), features.len());
        assert!(ds.rows.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn select_complete_unknown_column() {
        let table = build_feature_table(&make_bars(10), &FeatureSpec::default()).unwrap();
        let err = table.select_complete(&["nope".to_string()], "r01_fwd");
        assert!(matches!(err, Err(AlphalabError::DataFormat { .. })));
    }

    #[test]
    fn filter_range_is_inclusive() {
        let table = build_feature_table(&make_bars(10), &FeatureSpec::default()).unwrap();
        let start = NaiveDate::from_ymd_opt(2022, 1, 4);
        let end = NaiveDate::from_ymd_opt(2022, 1, 6);
        let sub = table.filter_range(start, end);
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.columns.len(), table.columns.len());
    }

    #[test]
    fn insert_rejects_wrong_length() {
        let mut table = FeatureTable::new(vec![NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()]);
        assert!(table.insert("x", vec![Some(1.0), Some(2.0)]).is_err());
        table.insert("x", vec![Some(1.0)]).unwrap();
        table.insert("x", vec![Some(2.0)]).unwrap();
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.column("x").unwrap()[0], Some(2.0));
    }
}
