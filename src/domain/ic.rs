//! Information coefficient: rank correlation between predictions and realized
//! forward returns, overall and per calendar date.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::stats;

/// Spearman correlation; `None` when undefined.
pub fn information_coefficient(y_true: &[f64], y_pred: &[f64]) -> Option<f64> {
    stats::spearman(y_true, y_pred)
}

/// IC per calendar date. Dates with fewer than two rows or an undefined
/// correlation map to `None`.
pub fn ic_by_day(
    timestamps: &[NaiveDateTime],
    y_true: &[f64],
    y_pred: &[f64],
) -> BTreeMap<NaiveDate, Option<f64>> {
    let mut groups: BTreeMap<NaiveDate, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for ((ts, &t), &p) in timestamps.iter().zip(y_true).zip(y_pred) {
        let entry = groups.entry(ts.date()).or_default();
        entry.0.push(t);
        entry.1.push(p);
    }
    groups
        .into_iter()
        .map(|(date, (t, p))| (date, stats::spearman(&t, &p)))
        .collect()
}

/// Daily IC for several boosting-round counts: `values[d][k]` is the IC on
/// `dates[d]` of predictions made with `iterations[k]` trees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailyIcTable {
    pub dates: Vec<NaiveDate>,
    pub iterations: Vec<usize>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl DailyIcTable {
    /// `predictions[k]` holds the predictions made with `iterations[k]` trees.
    pub fn build(
        timestamps: &[NaiveDateTime],
        y_true: &[f64],
        iterations: &[usize],
        predictions: &[Vec<f64>],
    ) -> Self {
        let per_iteration: Vec<BTreeMap<NaiveDate, Option<f64>>> = predictions
            .iter()
            .map(|p| ic_by_day(timestamps, y_true, p))
            .collect();
        let dates: Vec<NaiveDate> = per_iteration
            .first()
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        let values = dates
            .iter()
            .map(|d| {
                per_iteration
                    .iter()
                    .map(|m| m.get(d).copied().flatten())
                    .collect()
            })
            .collect();
        Self {
            dates,
            iterations: iterations.to_vec(),
            values,
        }
    }

    pub fn column(&self, k: usize) -> Vec<f64> {
        self.values.iter().filter_map(|row| row[k]).collect()
    }

    pub fn summary(&self) -> Option<DailyIcSummary> {
        let means: Vec<Option<f64>> = (0..self.iterations.len())
            .map(|k| stats::mean(&self.column(k)))
            .collect();
        let medians: Vec<Option<f64>> = (0..self.iterations.len())
            .map(|k| stats::median(&self.column(k)))
            .collect();
        let (mean_k, mean) = argmax(&means)?;
        let (median_k, median) = argmax(&medians)?;
        Some(DailyIcSummary {
            mean,
            mean_n: self.iterations[mean_k],
            median,
            median_n: self.iterations[median_k],
        })
    }
}

/// Best daily IC and the round count that achieved it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyIcSummary {
    pub mean: f64,
    pub mean_n: usize,
    pub median: f64,
    pub median_n: usize,
}

/// First index of the largest defined value.
pub fn argmax(values: &[Option<f64>]) -> Option<(usize, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .fold(None, |best, (i, x)| match best {
            Some((_, b)) if b >= x => best,
            _ => Some((i, x)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn overall_ic_is_rank_based() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let p = [10.0, 20.0, 30.0, 1000.0];
        assert_abs_diff_eq!(information_coefficient(&y, &p).unwrap(), 1.0);
        assert!(information_coefficient(&y, &[1.0; 4]).is_none());
    }

    #[test]
    fn groups_by_calendar_date() {
        let ts = [at(1, 0), at(1, 6), at(1, 12), at(2, 0), at(2, 6), at(3, 0)];
        let y = [1.0, 2.0, 3.0, 1.0, 2.0, 5.0];
        let p = [1.0, 2.0, 3.0, 2.0, 1.0, 4.0];
        let daily = ic_by_day(&ts, &y, &p);

        assert_eq!(daily.len(), 3);
        assert_abs_diff_eq!(daily[&at(1, 0).date()].unwrap(), 1.0);
        assert_abs_diff_eq!(daily[&at(2, 0).date()].unwrap(), -1.0);
        assert!(daily[&at(3, 0).date()].is_none());
    }

    #[test]
    fn summary_picks_best_round_count() {
        let ts = [at(1, 0), at(1, 6), at(1, 12), at(2, 0), at(2, 6), at(2, 12)];
        let y = [1.0, 2.0, 3.0, 3.0, 2.0, 1.0];
        let good = vec![1.0, 2.0, 3.0, 3.0, 2.0, 1.0];
        let bad = vec![3.0, 2.0, 1.0, 3.0, 2.0, 1.0];

        let table = DailyIcTable::build(&ts, &y, &[10, 50], &[bad, good]);
        assert_eq!(table.dates.len(), 2);
        let s = table.summary().unwrap();
        assert_eq!(s.mean_n, 50);
        assert_abs_diff_eq!(s.mean, 1.0);
        assert_eq!(s.median_n, 50);
    }

    #[test]
    fn summary_undefined_without_multi_row_days() {
        let ts = [at(1, 0), at(2, 0)];
        let table = DailyIcTable::build(&ts, &[1.0, 2.0], &[10], &[vec![1.0, 2.0]]);
        assert!(table.summary().is_none());
    }

    #[test]
    fn argmax_keeps_first_tie() {
        assert_eq!(argmax(&[None, Some(0.2), Some(0.2)]), Some((1, 0.2)));
        assert_eq!(argmax(&[None, None]), None);
    }
}
