//! Model selection over stored tuning results.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::dataset::Dataset;
use crate::domain::error::AlphalabError;
use crate::domain::linear::{ols_summary, OlsCoefficient};
use crate::domain::stats;
use crate::domain::tuning::{run_key, CvScope, ModelFamily, SUMMARY_COLUMNS, TIMESTAMP_FORMAT};
use crate::ports::store_port::ResultStore;

/// Overall IC of one parameter set at one boosting-round count.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub scope: CvScope,
    pub params: Vec<f64>,
    pub daily_ic_mean: f64,
    pub daily_ic_median: f64,
    pub boost_rounds: usize,
    pub ic: f64,
}

/// IC on one date of one parameter set at one boosting-round count.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyIcRecord {
    pub date: NaiveDate,
    pub scope: CvScope,
    pub params: Vec<f64>,
    pub boost_rounds: usize,
    pub ic: f64,
}

/// Mean daily IC of one parameter set at one boosting-round count.
#[derive(Debug, Clone, PartialEq)]
pub struct IcRecord {
    pub scope: CvScope,
    pub params: Vec<f64>,
    pub boost_rounds: usize,
    pub ic: f64,
}

impl IcRecord {
    pub fn model_key(&self) -> String {
        model_key(&self.scope, &self.params)
    }
}

pub fn model_key(scope: &CvScope, params: &[f64]) -> String {
    run_key(scope, params)
}

/// Split `<kind>/<lookahead>/<train>/<test>/<p1>/...` into scope and params.
fn parse_key(key: &str, family: ModelFamily) -> Result<(CvScope, Vec<f64>), AlphalabError> {
    let bad = || AlphalabError::store(format!("malformed result key {}", key));
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() != 4 + family.param_names().len() {
        return Err(bad());
    }
    let int = |s: &str| s.parse::<usize>().map_err(|_| bad());
    let scope = CvScope {
        lookahead: int(parts[1])?,
        train_length: int(parts[2])?,
        test_length: int(parts[3])?,
    };
    let params = parts[4..]
        .iter()
        .map(|s| s.parse::<f64>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((scope, params))
}

fn round_columns(columns: &[String]) -> Vec<(usize, usize)> {
    columns
        .iter()
        .enumerate()
        .filter_map(|(j, c)| c.parse::<usize>().ok().map(|n| (j, n)))
        .collect()
}

/// Melt every stored metrics table into one record per boosting-round count.
pub fn load_metrics(
    store: &dyn ResultStore,
    family: ModelFamily,
) -> Result<Vec<MetricRecord>, AlphalabError> {
    let mut out = Vec::new();
    for key in store.keys("metrics/")? {
        let (scope, params) = parse_key(&key, family)?;
        let table = store.get_table(&key)?;
        let rounds = round_columns(&table.columns);
        for r in 0..table.len() {
            let daily_ic_mean = table.value(r, SUMMARY_COLUMNS[1]).unwrap_or(f64::NAN);
            let daily_ic_median = table.value(r, SUMMARY_COLUMNS[3]).unwrap_or(f64::NAN);
            for &(j, boost_rounds) in &rounds {
                let ic = table.rows[r][j];
                if ic.is_nan() {
                    continue;
                }
                out.push(MetricRecord {
                    scope,
                    params: params.clone(),
                    daily_ic_mean,
                    daily_ic_median,
                    boost_rounds,
                    ic,
                });
            }
        }
    }
    Ok(out)
}

/// Melt every stored daily-IC table into per-date records.
pub fn load_daily_ic(
    store: &dyn ResultStore,
    family: ModelFamily,
) -> Result<Vec<DailyIcRecord>, AlphalabError> {
    let mut out = Vec::new();
    for key in store.keys("daily_ic/")? {
        let (scope, params) = parse_key(&key, family)?;
        let table = store.get_table(&key)?;
        let rounds = round_columns(&table.columns);
        for (r, label) in table.index.iter().enumerate() {
            let date = NaiveDate::parse_from_str(label, "%Y-%m-%d").map_err(|e| {
                AlphalabError::store(format!("bad date {} in {}: {}", label, key, e))
            })?;
            for &(j, boost_rounds) in &rounds {
                let ic = table.rows[r][j];
                if ic.is_nan() {
                    continue;
                }
                out.push(DailyIcRecord {
                    date,
                    scope,
                    params: params.clone(),
                    boost_rounds,
                    ic,
                });
            }
        }
    }
    Ok(out)
}

/// Mean IC per (scope, params, boost_rounds), in first-seen order.
pub fn aggregate_daily_ic(records: &[DailyIcRecord]) -> Vec<IcRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (IcRecord, Vec<f64>)> = HashMap::new();
    for r in records {
        let id = format!("{}#{}", model_key(&r.scope, &r.params), r.boost_rounds);
        let entry = groups.entry(id.clone()).or_insert_with(|| {
            order.push(id);
            (
                IcRecord {
                    scope: r.scope,
                    params: r.params.clone(),
                    boost_rounds: r.boost_rounds,
                    ic: 0.0,
                },
                Vec::new(),
            )
        });
        entry.1.push(r.ic);
    }
    order
        .into_iter()
        .filter_map(|id| groups.remove(&id))
        .filter_map(|(mut rec, ics)| {
            rec.ic = stats::mean(&ics)?;
            Some(rec)
        })
        .collect()
}

fn sorted_desc<T: Clone>(items: impl Iterator<Item = T>, score: impl Fn(&T) -> f64) -> Vec<T> {
    let mut v: Vec<T> = items.collect();
    v.sort_by(|a, b| score(b).total_cmp(&score(a)));
    v
}

/// The `n` best entries per lookahead by `score`, lookaheads ascending.
pub fn top_n_by_lookahead<T: Clone>(
    records: &[T],
    n: usize,
    lookahead: impl Fn(&T) -> usize,
    score: impl Fn(&T) -> f64,
) -> Vec<T> {
    let mut by_lookahead: BTreeMap<usize, Vec<T>> = BTreeMap::new();
    for r in records {
        by_lookahead.entry(lookahead(r)).or_default().push(r.clone());
    }
    by_lookahead
        .into_values()
        .flat_map(|group| sorted_desc(group.into_iter(), &score).into_iter().take(n))
        .collect()
}

/// The `rank`-th best aggregated record (0 = best) for `lookahead`.
pub fn best_params(records: &[IcRecord], lookahead: usize, rank: usize) -> Option<IcRecord> {
    sorted_desc(
        records.iter().filter(|r| r.scope.lookahead == lookahead).cloned(),
        |r| r.ic,
    )
    .into_iter()
    .nth(rank)
}

/// Daily IC series of one aggregated record, by date.
pub fn select_daily_ic(records: &[DailyIcRecord], best: &IcRecord) -> Vec<(NaiveDate, f64)> {
    let mut series: Vec<(NaiveDate, f64)> = records
        .iter()
        .filter(|r| {
            r.scope == best.scope && r.params == best.params && r.boost_rounds == best.boost_rounds
        })
        .map(|r| (r.date, r.ic))
        .collect();
    series.sort_by_key(|(d, _)| *d);
    series
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollingIc {
    pub rolling: Vec<(NaiveDate, f64)>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

/// `window`-date rolling mean of a daily IC series.
pub fn rolling_ic(daily: &[(NaiveDate, f64)], window: usize) -> RollingIc {
    let values: Vec<Option<f64>> = daily.iter().map(|(_, v)| Some(*v)).collect();
    let plain: Vec<f64> = daily.iter().map(|(_, v)| *v).collect();
    let rolled = stats::rolling_mean(&values, window, window);
    RollingIc {
        rolling: daily
            .iter()
            .zip(rolled)
            .filter_map(|((d, _), v)| v.map(|v| (*d, v)))
            .collect(),
        mean: stats::mean(&plain),
        median: stats::median(&plain),
    }
}

/// OLS of daily IC on dummy-encoded scope and hyperparameter levels.
pub fn hyperparameter_impact(
    records: &[DailyIcRecord],
    lookahead: usize,
    family: ModelFamily,
) -> Result<Vec<OlsCoefficient>, AlphalabError> {
    let mut names: Vec<String> = vec!["train_length".into(), "test_length".into()];
    names.extend(family.param_names().iter().map(|s| s.to_string()));
    names.push("boost_rounds".into());

    let selected: Vec<&DailyIcRecord> = records.iter().filter(|r| r.scope.lookahead == lookahead).collect();
    let timestamps: Vec<NaiveDateTime> = selected
        .iter()
        .map(|r| r.date.and_time(chrono::NaiveTime::MIN))
        .collect();
    let rows: Vec<Vec<f64>> = selected
        .iter()
        .map(|r| {
            let mut row = vec![r.scope.train_length as f64, r.scope.test_length as f64];
            row.extend_from_slice(&r.params);
            row.push(r.boost_rounds as f64);
            row
        })
        .collect();
    let targets = selected.iter().map(|r| r.ic).collect();

    let categoricals: Vec<&str> = names.iter().map(String::as_str).collect();
    let encoded = Dataset {
        timestamps,
        feature_names: names.clone(),
        rows,
        targets,
    }
    .with_dummies(&categoricals, true);

    ols_summary(&encoded.rows, &encoded.targets, &encoded.feature_names)
}

/// Stored predictions of the top models for one lookahead and their average.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsemblePredictions {
    pub timestamps: Vec<NaiveDateTime>,
    pub model_keys: Vec<String>,
    /// `[model][row]`, NaN where a model has no prediction for that row.
    pub predictions: Vec<Vec<f64>>,
    /// Mean of the first `average_top` models per row.
    pub factor: Vec<f64>,
}

/// Fetch the predictions of the `top_n` best models for `lookahead` at their
/// best boosting-round count, aligned on the best model's timestamps, and
/// average the first `average_top` into a factor.
pub fn ensemble_predictions(
    store: &dyn ResultStore,
    ranked: &[IcRecord],
    lookahead: usize,
    top_n: usize,
    average_top: usize,
) -> Result<EnsemblePredictions, AlphalabError> {
    let mut timestamps: Vec<NaiveDateTime> = Vec::new();
    let mut model_keys = Vec::new();
    let mut predictions: Vec<Vec<f64>> = Vec::new();

    for rank in 0..top_n {
        let Some(best) = best_params(ranked, lookahead, rank) else {
            break;
        };
        let key = best.model_key();
        let table = store.get_table(&format!("predictions/{}", key))?;
        let column = table.column(&best.boost_rounds.to_string()).ok_or_else(|| {
            AlphalabError::store(format!("predictions/{} lacks column {}", key, best.boost_rounds))
        })?;
        let stamps = table
            .index
            .iter()
            .map(|s| {
                NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                    .map_err(|e| AlphalabError::store(format!("bad timestamp {}: {}", s, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if rank == 0 {
            let mut pairs: Vec<(NaiveDateTime, f64)> = stamps.into_iter().zip(column).collect();
            pairs.sort_by_key(|(t, _)| *t);
            timestamps = pairs.iter().map(|(t, _)| *t).collect();
            predictions.push(pairs.into_iter().map(|(_, v)| v).collect());
        } else {
            let lookup: HashMap<NaiveDateTime, f64> = stamps.into_iter().zip(column).collect();
            predictions.push(
                timestamps
                    .iter()
                    .map(|t| lookup.get(t).copied().unwrap_or(f64::NAN))
                    .collect(),
            );
        }
        model_keys.push(key);
    }

    if predictions.is_empty() {
        return Err(AlphalabError::NoData {
            symbol: format!("tuning results for lookahead {}", lookahead),
        });
    }

    let k = average_top.clamp(1, predictions.len());
    let factor = (0..timestamps.len())
        .map(|r| {
            let vals: Vec<f64> = predictions[..k]
                .iter()
                .map(|p| p[r])
                .filter(|v| !v.is_nan())
                .collect();
            stats::mean(&vals).unwrap_or(f64::NAN)
        })
        .collect();

    Ok(EnsemblePredictions {
        timestamps,
        model_keys,
        predictions,
        factor,
    })
}
