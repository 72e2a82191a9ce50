//! Factor evaluation against forward price returns.
//!
//! Quantiles, demeaning and factor weights are computed within each
//! timestamp's cross-section when every timestamp carries at least
//! `quantiles` assets. With thinner cross-sections (a single asset, say)
//! they are computed over the full history instead.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;

use crate::domain::error::AlphalabError;
use crate::domain::stats;

/// One factor value to be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorObservation {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub value: f64,
}

/// Close prices per asset, oldest first.
pub type PriceHistory = BTreeMap<String, Vec<(NaiveDateTime, f64)>>;

#[derive(Debug, Clone, PartialEq)]
pub struct FactorRow {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub factor: f64,
    /// 1-based quantile.
    pub quantile: usize,
    /// Forward return for each configured period.
    pub forward_returns: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    ByTimestamp,
    FullHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactorData {
    pub periods: Vec<usize>,
    pub quantiles: usize,
    pub grouping: Grouping,
    pub rows: Vec<FactorRow>,
}

impl FactorData {
    /// Align factor values with forward returns over `periods` bars and
    /// bucket them into `quantiles`. A factor timestamp without an exact
    /// price uses the next available one. Rows lacking any forward return
    /// are dropped.
    pub fn build(
        factor: &[FactorObservation],
        prices: &PriceHistory,
        quantiles: usize,
        periods: &[usize],
    ) -> Result<Self, AlphalabError> {
        if quantiles < 2 {
            return Err(AlphalabError::invalid("evaluation", "quantiles", "need at least 2"));
        }
        if periods.is_empty() || periods.contains(&0) {
            return Err(AlphalabError::invalid("evaluation", "periods", "must be positive"));
        }

        let mut aligned: Vec<(NaiveDateTime, String, f64, Vec<f64>)> = Vec::new();
        for obs in factor.iter().filter(|o| o.value.is_finite()) {
            let Some(series) = prices.get(&obs.asset) else { continue };
            let start = series.partition_point(|(t, _)| *t < obs.timestamp);
            let Some(&(_, base)) = series.get(start) else { continue };
            let fwd: Option<Vec<f64>> = periods
                .iter()
                .map(|&p| series.get(start + p).map(|&(_, px)| px / base - 1.0))
                .collect();
            if let Some(fwd) = fwd {
                aligned.push((obs.timestamp, obs.asset.clone(), obs.value, fwd));
            }
        }
        if aligned.is_empty() {
            return Err(AlphalabError::InsufficientData {
                what: "factor analysis".into(),
                have: 0,
                need: 1,
            });
        }
        aligned.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut per_ts: BTreeMap<NaiveDateTime, usize> = BTreeMap::new();
        for (ts, ..) in &aligned {
            *per_ts.entry(*ts).or_default() += 1;
        }
        let grouping = if per_ts.values().all(|&n| n >= quantiles) {
            Grouping::ByTimestamp
        } else {
            Grouping::FullHistory
        };

        let mut bucket = vec![None; aligned.len()];
        for idx in groups_of(&aligned.iter().map(|a| a.0).collect::<Vec<_>>(), grouping) {
            let values: Vec<Option<f64>> = idx.iter().map(|&i| Some(aligned[i].2)).collect();
            for (&i, q) in idx.iter().zip(stats::qcut(&values, quantiles)) {
                bucket[i] = q;
            }
        }

        let rows = aligned
            .into_iter()
            .zip(bucket)
            .filter_map(|((timestamp, asset, factor, forward_returns), q)| {
                q.map(|q| FactorRow {
                    timestamp,
                    asset,
                    factor,
                    quantile: q + 1,
                    forward_returns,
                })
            })
            .collect();

        Ok(Self {
            periods: periods.to_vec(),
            quantiles,
            grouping,
            rows,
        })
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        let set: BTreeSet<NaiveDateTime> = self.rows.iter().map(|r| r.timestamp).collect();
        set.into_iter().collect()
    }

    fn groups(&self) -> Vec<Vec<usize>> {
        groups_of(&self.rows.iter().map(|r| r.timestamp).collect::<Vec<_>>(), self.grouping)
    }

    /// Forward returns minus their group mean, `[row][period]`.
    pub fn demeaned_returns(&self) -> Vec<Vec<f64>> {
        let mut out = vec![vec![0.0; self.periods.len()]; self.rows.len()];
        for idx in self.groups() {
            for k in 0..self.periods.len() {
                let vals: Vec<f64> = idx.iter().map(|&i| self.rows[i].forward_returns[k]).collect();
                let m = stats::mean(&vals).unwrap_or(0.0);
                for &i in &idx {
                    out[i][k] = self.rows[i].forward_returns[k] - m;
                }
            }
        }
        out
    }

    /// Mean (optionally demeaned) forward return per quantile, `[quantile - 1][period]`.
    pub fn mean_return_by_quantile(&self, demeaned: bool) -> Vec<Vec<QuantileReturn>> {
        let returns = self.returns(demeaned);
        (1..=self.quantiles)
            .map(|q| {
                (0..self.periods.len())
                    .map(|k| {
                        let vals: Vec<f64> = self
                            .rows
                            .iter()
                            .zip(&returns)
                            .filter(|(r, _)| r.quantile == q)
                            .map(|(_, ret)| ret[k])
                            .collect();
                        QuantileReturn::from_values(&vals)
                    })
                    .collect()
            })
            .collect()
    }

    /// Top minus bottom quantile mean return per period.
    pub fn mean_return_spread(&self, demeaned: bool) -> Vec<QuantileReturn> {
        let by_q = self.mean_return_by_quantile(demeaned);
        let (top, bottom) = (&by_q[self.quantiles - 1], &by_q[0]);
        top.iter()
            .zip(bottom)
            .map(|(t, b)| QuantileReturn {
                mean: t.mean - b.mean,
                std_err: (t.std_err.powi(2) + b.std_err.powi(2)).sqrt(),
                count: t.count.min(b.count),
            })
            .collect()
    }

    /// Rank IC of factor versus forward return, one entry per group and period:
    /// `[group][period]` ordered by time.
    pub fn factor_information_coefficient(&self) -> Vec<(NaiveDateTime, Vec<Option<f64>>)> {
        self.groups()
            .into_iter()
            .map(|idx| {
                let ts = self.rows[idx[0]].timestamp;
                let factor: Vec<f64> = idx.iter().map(|&i| self.rows[i].factor).collect();
                let ics = (0..self.periods.len())
                    .map(|k| {
                        let fwd: Vec<f64> =
                            idx.iter().map(|&i| self.rows[i].forward_returns[k]).collect();
                        stats::spearman(&factor, &fwd)
                    })
                    .collect();
                (ts, ics)
            })
            .collect()
    }

    /// Factor-weighted long/short return per timestamp and period.
    ///
    /// Weights are the demeaned factor scaled to unit mean absolute weight
    /// within each group, so a full-history group goes long above-average
    /// readings and short below-average ones.
    pub fn factor_returns(&self) -> Vec<(NaiveDateTime, Vec<f64>)> {
        let mut weights = vec![0.0; self.rows.len()];
        for idx in self.groups() {
            let vals: Vec<f64> = idx.iter().map(|&i| self.rows[i].factor).collect();
            let m = stats::mean(&vals).unwrap_or(0.0);
            let gross = vals.iter().map(|v| (v - m).abs()).sum::<f64>();
            if gross == 0.0 {
                continue;
            }
            let scale = match self.grouping {
                Grouping::ByTimestamp => gross,
                Grouping::FullHistory => gross / idx.len() as f64,
            };
            for &i in &idx {
                weights[i] = (self.rows[i].factor - m) / scale;
            }
        }

        let mut by_ts: BTreeMap<NaiveDateTime, Vec<f64>> = BTreeMap::new();
        for (row, w) in self.rows.iter().zip(&weights) {
            let acc = by_ts
                .entry(row.timestamp)
                .or_insert_with(|| vec![0.0; self.periods.len()]);
            for (a, r) in acc.iter_mut().zip(&row.forward_returns) {
                *a += w * r;
            }
        }
        by_ts.into_iter().collect()
    }

    /// Mean return per timestamp of each quantile for period index `k`,
    /// `[quantile - 1]` of `(timestamp, return)`.
    pub fn quantile_returns_by_timestamp(&self, k: usize, demeaned: bool) -> Vec<Vec<(NaiveDateTime, f64)>> {
        let returns = self.returns(demeaned);
        (1..=self.quantiles)
            .map(|q| {
                let mut by_ts: BTreeMap<NaiveDateTime, Vec<f64>> = BTreeMap::new();
                for (row, ret) in self.rows.iter().zip(&returns) {
                    if row.quantile == q {
                        by_ts.entry(row.timestamp).or_default().push(ret[k]);
                    }
                }
                by_ts
                    .into_iter()
                    .filter_map(|(t, v)| stats::mean(&v).map(|m| (t, m)))
                    .collect()
            })
            .collect()
    }

    /// Share of quantile `q` members at each timestamp that were not members
    /// `period` timestamps earlier.
    pub fn quantile_turnover(&self, q: usize, period: usize) -> Vec<(NaiveDateTime, f64)> {
        let stamps = self.timestamps();
        let mut members: HashMap<NaiveDateTime, BTreeSet<&str>> = HashMap::new();
        for row in self.rows.iter().filter(|r| r.quantile == q) {
            members.entry(row.timestamp).or_default().insert(row.asset.as_str());
        }
        let empty = BTreeSet::new();
        stamps
            .iter()
            .enumerate()
            .skip(period)
            .filter_map(|(i, t)| {
                let now = members.get(t).unwrap_or(&empty);
                if now.is_empty() {
                    return None;
                }
                let before = members.get(&stamps[i - period]).unwrap_or(&empty);
                let new = now.difference(before).count();
                Some((*t, new as f64 / now.len() as f64))
            })
            .collect()
    }

    fn returns(&self, demeaned: bool) -> Vec<Vec<f64>> {
        if demeaned {
            self.demeaned_returns()
        } else {
            self.rows.iter().map(|r| r.forward_returns.clone()).collect()
        }
    }
}

fn groups_of(timestamps: &[NaiveDateTime], grouping: Grouping) -> Vec<Vec<usize>> {
    match grouping {
        Grouping::FullHistory => {
            if timestamps.is_empty() {
                Vec::new()
            } else {
                vec![(0..timestamps.len()).collect()]
            }
        }
        Grouping::ByTimestamp => {
            let mut map: BTreeMap<NaiveDateTime, Vec<usize>> = BTreeMap::new();
            for (i, t) in timestamps.iter().enumerate() {
                map.entry(*t).or_default().push(i);
            }
            map.into_values().collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileReturn {
    pub mean: f64,
    pub std_err: f64,
    pub count: usize,
}

impl QuantileReturn {
    fn from_values(values: &[f64]) -> Self {
        let mean = stats::mean(values).unwrap_or(f64::NAN);
        let std_err = stats::std_dev(values, 1)
            .map(|s| s / (values.len() as f64).sqrt())
            .unwrap_or(f64::NAN);
        Self {
            mean,
            std_err,
            count: values.len(),
        }
    }
}

/// Convert a `period`-bar return into a per-bar rate.
pub fn rate_of_return(ret: f64, period: usize) -> f64 {
    (1.0 + ret).powf(1.0 / period.max(1) as f64) - 1.0
}

/// Compounded growth of 1 minus 1.
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
    let mut acc = 1.0;
    returns
        .iter()
        .map(|r| {
            acc *= 1.0 + r;
            acc - 1.0
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileStats {
    pub quantile: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IcStats {
    pub period: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub risk_adjusted: Option<f64>,
    pub t_stat: Option<f64>,
    pub p_value: Option<f64>,
    pub observations: usize,
}

impl IcStats {
    fn from_values(period: usize, values: &[f64]) -> Self {
        let mean = stats::mean(values);
        let std = stats::std_dev(values, 1);
        let risk_adjusted = match (mean, std) {
            (Some(m), Some(s)) if s > 0.0 => Some(m / s),
            _ => None,
        };
        let t_stat = risk_adjusted.map(|ra| ra * (values.len() as f64).sqrt());
        Self {
            period,
            mean,
            std,
            risk_adjusted,
            t_stat,
            p_value: t_stat.map(|t| 2.0 * (1.0 - stats::normal_cdf(t.abs()))),
            observations: values.len(),
        }
    }
}

/// Everything the report shows about one factor.
#[derive(Debug, Clone, PartialEq)]
pub struct TearSheet {
    pub periods: Vec<usize>,
    pub quantiles: usize,
    pub grouping: Grouping,
    pub observations: usize,
    pub quantile_stats: Vec<QuantileStats>,
    /// Per-bar rate of mean demeaned return, `[quantile - 1][period]`.
    pub mean_return_by_quantile: Vec<Vec<QuantileReturn>>,
    pub spread: Vec<QuantileReturn>,
    pub ic: Vec<IcStats>,
    /// Cumulative factor-weighted return of the first period.
    pub cumulative_factor_returns: Vec<(NaiveDateTime, f64)>,
    /// Cumulative return per quantile of the first period, `[quantile - 1]`.
    pub cumulative_by_quantile: Vec<Vec<(NaiveDateTime, f64)>>,
    /// Mean turnover, `[quantile - 1][period]`.
    pub mean_turnover: Vec<Vec<Option<f64>>>,
}

impl TearSheet {
    pub fn from_factor_data(data: &FactorData) -> Self {
        let total = data.rows.len();
        let quantile_stats = (1..=data.quantiles)
            .map(|q| {
                let vals: Vec<f64> = data
                    .rows
                    .iter()
                    .filter(|r| r.quantile == q)
                    .map(|r| r.factor)
                    .collect();
                QuantileStats {
                    quantile: q,
                    min: vals.iter().cloned().fold(f64::INFINITY, f64::min),
                    max: vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    mean: stats::mean(&vals).unwrap_or(f64::NAN),
                    std: stats::std_dev(&vals, 1).unwrap_or(f64::NAN),
                    count: vals.len(),
                    pct: if total > 0 {
                        vals.len() as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        let mean_return_by_quantile = data
            .mean_return_by_quantile(true)
            .into_iter()
            .map(|per_period| {
                per_period
                    .into_iter()
                    .zip(&data.periods)
                    .map(|(r, &p)| QuantileReturn {
                        mean: rate_of_return(r.mean, p),
                        ..r
                    })
                    .collect()
            })
            .collect();

        let ic_by_group = data.factor_information_coefficient();
        let ic = data
            .periods
            .iter()
            .enumerate()
            .map(|(k, &p)| {
                let vals: Vec<f64> = ic_by_group.iter().filter_map(|(_, v)| v[k]).collect();
                IcStats::from_values(p, &vals)
            })
            .collect();

        let first_period = data.periods[0];
        let factor_returns = data.factor_returns();
        let rates: Vec<f64> = factor_returns
            .iter()
            .map(|(_, r)| rate_of_return(r[0], first_period))
            .collect();
        let cumulative_factor_returns = factor_returns
            .iter()
            .map(|(t, _)| *t)
            .zip(cumulative_returns(&rates))
            .collect();

        let cumulative_by_quantile = data
            .quantile_returns_by_timestamp(0, true)
            .into_iter()
            .map(|series| {
                let rates: Vec<f64> = series
                    .iter()
                    .map(|(_, r)| rate_of_return(*r, first_period))
                    .collect();
                series
                    .iter()
                    .map(|(t, _)| *t)
                    .zip(cumulative_returns(&rates))
                    .collect()
            })
            .collect();

        let mean_turnover = (1..=data.quantiles)
            .map(|q| {
                data.periods
                    .iter()
                    .map(|&p| {
                        let vals: Vec<f64> =
                            data.quantile_turnover(q, p).into_iter().map(|(_, v)| v).collect();
                        stats::mean(&vals)
                    })
                    .collect()
            })
            .collect();

        Self {
            periods: data.periods.clone(),
            quantiles: data.quantiles,
            grouping: data.grouping,
            observations: total,
            quantile_stats,
            mean_return_by_quantile,
            spread: data.mean_return_spread(true),
            ic,
            cumulative_factor_returns,
            cumulative_by_quantile,
            mean_turnover,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, NaiveDate};

    fn t(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(i)
    }

    /// Single asset whose factor equals the next bar's return.
    fn perfect_single_asset(n: usize) -> (Vec<FactorObservation>, PriceHistory) {
        let mut closes = vec![100.0];
        for i in 0..n {
            let r = ((i * 7) % 11) as f64 / 100.0 - 0.05;
            let last = closes[closes.len() - 1];
            closes.push(last * (1.0 + r));
        }
        let series: Vec<(NaiveDateTime, f64)> =
            closes.iter().enumerate().map(|(i, &c)| (t(i as i64), c)).collect();
        let factor = (0..n)
            .map(|i| FactorObservation {
                timestamp: t(i as i64),
                asset: "BTCUSDT".into(),
                value: closes[i + 1] / closes[i] - 1.0,
            })
            .collect();
        let mut prices = PriceHistory::new();
        prices.insert("BTCUSDT".into(), series);
        (factor, prices)
    }

    #[test]
    fn single_asset_uses_full_history_quantiles() {
        let (factor, prices) = perfect_single_asset(50);
        let data = FactorData::build(&factor, &prices, 5, &[1, 5]).unwrap();

        assert_eq!(data.grouping, Grouping::FullHistory);
        // the last four bars lack a 5-bar forward return
        assert_eq!(data.rows.len(), 46);
        assert!(data.rows.iter().all(|r| (1..=5).contains(&r.quantile)));
        assert_abs_diff_eq!(data.rows[0].forward_returns[0], factor[0].value, epsilon = 1e-12);
    }

    #[test]
    fn perfect_factor_has_unit_ic_and_positive_spread() {
        let (factor, prices) = perfect_single_asset(60);
        let data = FactorData::build(&factor, &prices, 5, &[1]).unwrap();
        let ic = data.factor_information_coefficient();
        assert_eq!(ic.len(), 1);
        assert_abs_diff_eq!(ic[0].1[0].unwrap(), 1.0, epsilon = 1e-12);

        let spread = data.mean_return_spread(true);
        assert!(spread[0].mean > 0.0);

        let fr = data.factor_returns();
        assert!(fr.iter().map(|(_, r)| r[0]).sum::<f64>() > 0.0);
    }

    #[test]
    fn factor_timestamps_snap_to_next_price() {
        let prices: PriceHistory = [(
            "X".to_string(),
            vec![(t(0), 10.0), (t(2), 11.0), (t(3), 12.1)],
        )]
        .into_iter()
        .collect();
        let factor = vec![
            FactorObservation {
                timestamp: t(1),
                asset: "X".into(),
                value: 1.0,
            },
            FactorObservation {
                timestamp: t(0),
                asset: "X".into(),
                value: 2.0,
            },
        ];
        let data = FactorData::build(&factor, &prices, 2, &[1]).unwrap();
        assert_eq!(data.rows.len(), 2);
        // t(1) uses the t(2) price as its base
        assert_abs_diff_eq!(data.rows[1].forward_returns[0], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(data.rows[0].forward_returns[0], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn cross_section_groups_by_timestamp() {
        let mut prices = PriceHistory::new();
        let mut factor = Vec::new();
        for (a, growth) in [("A", 0.01), ("B", 0.02), ("C", 0.03), ("D", 0.04)] {
            let series = (0..10)
                .map(|i| (t(i), 100.0 * (1.0f64 + growth).powi(i as i32)))
                .collect();
            prices.insert(a.to_string(), series);
            for i in 0..9 {
                factor.push(FactorObservation {
                    timestamp: t(i),
                    asset: a.into(),
                    value: growth,
                });
            }
        }
        let data = FactorData::build(&factor, &prices, 2, &[1]).unwrap();
        assert_eq!(data.grouping, Grouping::ByTimestamp);

        let ic = data.factor_information_coefficient();
        assert_eq!(ic.len(), 9);
        assert!(ic.iter().all(|(_, v)| (v[0].unwrap() - 1.0).abs() < 1e-12));

        // demeaned returns sum to zero within each timestamp
        let dm = data.demeaned_returns();
        let first: f64 = (0..4).map(|i| dm[i][0]).sum();
        assert_abs_diff_eq!(first, 0.0, epsilon = 1e-12);

        // membership never changes
        let turnover = data.quantile_turnover(2, 1);
        assert!(turnover.iter().all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn rejects_bad_settings() {
        let (factor, prices) = perfect_single_asset(10);
        assert!(FactorData::build(&factor, &prices, 1, &[1]).is_err());
        assert!(FactorData::build(&factor, &prices, 5, &[]).is_err());
        assert!(FactorData::build(&factor, &PriceHistory::new(), 5, &[1]).is_err());
    }

    #[test]
    fn tear_sheet_collects_statistics() {
        let (factor, prices) = perfect_single_asset(80);
        let data = FactorData::build(&factor, &prices, 5, &[1, 5]).unwrap();
        let sheet = TearSheet::from_factor_data(&data);

        assert_eq!(sheet.quantile_stats.len(), 5);
        let pct: f64 = sheet.quantile_stats.iter().map(|q| q.pct).sum();
        assert_abs_diff_eq!(pct, 100.0, epsilon = 1e-9);
        assert_eq!(sheet.ic.len(), 2);
        assert_eq!(sheet.ic[0].observations, 1);
        assert!(sheet.ic[0].std.is_none());
        assert_eq!(sheet.cumulative_factor_returns.len(), data.rows.len());
        assert!(sheet.cumulative_factor_returns.last().unwrap().1 > 0.0);
    }

    #[test]
    fn return_helpers() {
        assert_abs_diff_eq!(rate_of_return(0.21, 2), 0.1, epsilon = 1e-12);
        let cum = cumulative_returns(&[0.1, -0.5]);
        assert_abs_diff_eq!(cum[1], -0.45, epsilon = 1e-12);
    }
}
