//! Walk-forward model evaluation and randomized hyperparameter search.
//!
//! For every (lookahead, train length, test length) scope the linear
//! baseline and the gradient-boosting searches fit one model per fold, score
//! out-of-sample predictions by information coefficient, and persist their
//! results through a [`ResultStore`].

use std::time::Instant;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::domain::cv::{n_splits_for_year, MultipleTimeSeriesCv};
use crate::domain::dataset::Dataset;
use crate::domain::error::AlphalabError;
use crate::domain::features::{label_column, FeatureTable};
use crate::domain::gbm::{Booster, GbmParams, TreeGrowth};
use crate::domain::ic::{information_coefficient, DailyIcSummary, DailyIcTable};
use crate::domain::linear::LinearRegression;
use crate::domain::results::{format_param, ResultTable};
use crate::domain::stats;
use crate::ports::store_port::ResultStore;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cross-validation scope of one tuning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvScope {
    pub lookahead: usize,
    pub train_length: usize,
    pub test_length: usize,
}

impl CvScope {
    pub fn label(&self) -> String {
        label_column(self.lookahead)
    }

    pub fn key_prefix(&self) -> String {
        format!("{}/{}/{}", self.lookahead, self.train_length, self.test_length)
    }

    pub fn splitter(&self, n_splits: usize) -> MultipleTimeSeriesCv {
        MultipleTimeSeriesCv::new(n_splits, self.train_length, self.test_length, self.lookahead)
    }
}

/// Which boosting flavour a search explores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    LightGbm,
    CatBoost,
}

impl ModelFamily {
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::LightGbm => &[
                "learning_rate",
                "num_leaves",
                "feature_fraction",
                "min_data_in_leaf",
            ],
            ModelFamily::CatBoost => &["max_depth", "min_child_samples"],
        }
    }

    /// Directory name of this family's result store.
    pub fn store_name(&self) -> &'static str {
        match self {
            ModelFamily::LightGbm => "tuning_lgb",
            ModelFamily::CatBoost => "tuning_catboost",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuningConfig {
    pub lookaheads: Vec<usize>,
    pub train_lengths: Vec<usize>,
    pub test_lengths: Vec<usize>,
    /// Folds per scope; `None` covers one trading year of test windows.
    pub n_splits: Option<usize>,
    pub learning_rates: Vec<f64>,
    /// Leaf budgets are `2^depth` for each entry.
    pub max_depths: Vec<usize>,
    pub feature_fractions: Vec<f64>,
    pub min_data_in_leaf: Vec<usize>,
    pub catboost_depths: Vec<usize>,
    pub catboost_min_child_samples: Vec<usize>,
    pub catboost_learning_rate: f64,
    pub num_iterations: Vec<usize>,
    pub sample_fraction: f64,
    pub seed: u64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub categoricals: Vec<String>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        let mut num_iterations = vec![10, 25, 50, 75];
        num_iterations.extend((100..=350).step_by(50));
        Self {
            lookaheads: vec![1, 5, 21],
            train_lengths: vec![252],
            test_lengths: vec![63],
            n_splits: None,
            learning_rates: vec![0.01, 0.1, 0.3],
            max_depths: vec![2, 3, 5, 7],
            feature_fractions: vec![0.3, 0.6, 0.95],
            min_data_in_leaf: vec![75, 150, 300],
            catboost_depths: vec![3, 5, 7, 9],
            catboost_min_child_samples: vec![20, 250, 500],
            catboost_learning_rate: 0.1,
            num_iterations,
            sample_fraction: 0.5,
            seed: 42,
            start: NaiveDate::from_ymd_opt(2020, 1, 1),
            end: NaiveDate::from_ymd_opt(2021, 12, 31),
            categoricals: vec!["year".into(), "month".into(), "weekday".into()],
        }
    }
}

impl TuningConfig {
    pub fn scopes(&self) -> Vec<CvScope> {
        let mut out = Vec::new();
        for &lookahead in &self.lookaheads {
            for &train_length in &self.train_lengths {
                for &test_length in &self.test_lengths {
                    out.push(CvScope {
                        lookahead,
                        train_length,
                        test_length,
                    });
                }
            }
        }
        out
    }

    pub fn n_splits_for(&self, scope: &CvScope) -> usize {
        self.n_splits
            .unwrap_or_else(|| n_splits_for_year(scope.test_length))
    }

    /// Full parameter grid of `family`, values ordered as `param_names()`.
    pub fn grid(&self, family: ModelFamily) -> Vec<Vec<f64>> {
        let mut out = Vec::new();
        match family {
            ModelFamily::LightGbm => {
                for &lr in &self.learning_rates {
                    for &depth in &self.max_depths {
                        for &ff in &self.feature_fractions {
                            for &min_data in &self.min_data_in_leaf {
                                let leaves = 1usize << depth.min(16);
                                out.push(vec![lr, leaves as f64, ff, min_data as f64]);
                            }
                        }
                    }
                }
            }
            ModelFamily::CatBoost => {
                for &depth in &self.catboost_depths {
                    for &min_child in &self.catboost_min_child_samples {
                        out.push(vec![depth as f64, min_child as f64]);
                    }
                }
            }
        }
        out
    }

    /// Booster parameters for one grid point.
    pub fn gbm_params(&self, family: ModelFamily, values: &[f64], num_boost_round: usize) -> GbmParams {
        let base = GbmParams {
            num_boost_round,
            seed: self.seed,
            ..GbmParams::default()
        };
        match family {
            ModelFamily::LightGbm => GbmParams {
                learning_rate: values[0],
                num_leaves: values[1] as usize,
                feature_fraction: values[2],
                min_data_in_leaf: values[3] as usize,
                growth: TreeGrowth::LeafWise,
                ..base
            },
            ModelFamily::CatBoost => GbmParams {
                learning_rate: self.catboost_learning_rate,
                max_depth: values[0] as usize,
                min_data_in_leaf: values[1] as usize,
                growth: TreeGrowth::Symmetric,
                ..base
            },
        }
    }
}

/// `lookahead/train/test/<param values>`.
pub fn run_key(scope: &CvScope, values: &[f64]) -> String {
    let params: Vec<String> = values.iter().map(|&v| format_param(v)).collect();
    format!("{}/{}", scope.key_prefix(), params.join("/"))
}

/// `HH:MM:SS`
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// Complete rows of `table` for `scope`'s label.
fn scope_dataset(
    table: &FeatureTable,
    scope: &CvScope,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Dataset, AlphalabError> {
    let label = scope.label();
    if table.column(&label).is_none() {
        return Err(AlphalabError::invalid(
            "tuning",
            "lookaheads",
            format!("no label column {} for lookahead {}", label, scope.lookahead),
        ));
    }
    let data = table
        .filter_range(start, end)
        .select_complete(&table.feature_names(), &label)?;
    if data.is_empty() {
        return Err(AlphalabError::InsufficientData {
            what: format!("lookahead {}", scope.lookahead),
            have: 0,
            need: scope.train_length + scope.test_length,
        });
    }
    Ok(data)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearMetrics {
    pub scope: CvScope,
    /// Mean of the per-fold ICs.
    pub ic_by_day: Option<f64>,
    /// IC over all out-of-sample predictions.
    pub ic: Option<f64>,
}

/// Walk-forward OLS baseline on one-hot encoded calendar features.
pub fn run_linear_baseline(
    table: &FeatureTable,
    config: &TuningConfig,
) -> Result<Vec<LinearMetrics>, AlphalabError> {
    let categoricals: Vec<&str> = config.categoricals.iter().map(String::as_str).collect();
    let mut out = Vec::new();

    for scope in config.scopes() {
        let data = scope_dataset(table, &scope, None, None)?.with_dummies(&categoricals, true);
        let splits = scope.splitter(config.n_splits_for(&scope)).split(&data.timestamps);

        let mut fold_ic = Vec::new();
        let mut y_true = Vec::new();
        let mut y_pred = Vec::new();
        for split in &splits {
            let train = data.subset(&split.train_indices);
            let test = data.subset(&split.test_indices);
            let model = LinearRegression::fit(&train.rows, &train.targets)?;
            let preds = model.predict(&test.rows);
            if let Some(ic) = information_coefficient(&test.targets, &preds) {
                fold_ic.push(ic);
            }
            y_true.extend_from_slice(&test.targets);
            y_pred.extend(preds);
        }

        let metrics = LinearMetrics {
            scope,
            ic_by_day: stats::mean(&fold_ic),
            ic: information_coefficient(&y_true, &y_pred),
        };
        info!(
            lookahead = scope.lookahead,
            train = scope.train_length,
            test = scope.test_length,
            folds = splits.len(),
            ic = ?metrics.ic,
            "linear baseline"
        );
        out.push(metrics);
    }
    Ok(out)
}

/// Top `n` scopes per lookahead ranked by `ic_by_day`.
pub fn best_linear_by_lookahead(metrics: &[LinearMetrics], n: usize) -> Vec<LinearMetrics> {
    let mut lookaheads: Vec<usize> = metrics.iter().map(|m| m.scope.lookahead).collect();
    lookaheads.sort_unstable();
    lookaheads.dedup();

    let mut out = Vec::new();
    for t in lookaheads {
        let mut group: Vec<&LinearMetrics> = metrics
            .iter()
            .filter(|m| m.scope.lookahead == t && m.ic_by_day.is_some())
            .collect();
        group.sort_by(|a, b| {
            b.ic_by_day
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.ic_by_day.unwrap_or(f64::NEG_INFINITY))
        });
        out.extend(group.into_iter().take(n).cloned());
    }
    out
}

pub fn linear_metrics_table(metrics: &[LinearMetrics]) -> Result<ResultTable, AlphalabError> {
    let columns = ["lookahead", "train_length", "test_length", "ic_by_day", "ic"];
    let mut table = ResultTable::new("run", columns.iter().map(|c| c.to_string()).collect());
    for (i, m) in metrics.iter().enumerate() {
        table.push_row(
            i.to_string(),
            vec![
                m.scope.lookahead as f64,
                m.scope.train_length as f64,
                m.scope.test_length as f64,
                m.ic_by_day.unwrap_or(f64::NAN),
                m.ic.unwrap_or(f64::NAN),
            ],
        )?;
    }
    Ok(table)
}

/// Outcome of one parameter set on one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct GbmRunMetrics {
    pub scope: CvScope,
    pub params: Vec<f64>,
    pub seconds: f64,
    pub daily: Option<DailyIcSummary>,
    /// Overall IC for each entry of `num_iterations`.
    pub ic: Vec<Option<f64>>,
}

impl GbmRunMetrics {
    pub fn best_ic(&self) -> Option<f64> {
        self.ic.iter().flatten().cloned().reduce(f64::max)
    }
}

/// Out-of-sample predictions of one parameter set across all folds.
#[derive(Debug, Clone, Default)]
struct FoldPredictions {
    timestamps: Vec<chrono::NaiveDateTime>,
    y_test: Vec<f64>,
    fold: Vec<usize>,
    /// `[iteration][row]`
    by_iteration: Vec<Vec<f64>>,
}

/// Randomized search of `family`'s grid over every scope of `config`.
pub fn run_gbm_search(
    table: &FeatureTable,
    config: &TuningConfig,
    family: ModelFamily,
    store: &mut dyn ResultStore,
) -> Result<Vec<GbmRunMetrics>, AlphalabError> {
    let iterations = &config.num_iterations;
    let num_boost_round = iterations.iter().copied().max().ok_or_else(|| {
        AlphalabError::invalid("tuning", "num_iterations", "at least one value required")
    })?;
    let grid = config.grid(family);
    if grid.is_empty() {
        return Err(AlphalabError::invalid("tuning", "grid", "parameter grid is empty"));
    }
    let categoricals: Vec<&str> = config.categoricals.iter().map(String::as_str).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut results = Vec::new();
    let mut elapsed = 0.0;

    for scope in config.scopes() {
        let data = scope_dataset(table, &scope, config.start, config.end)?.factorize(&categoricals);
        let splits = scope.splitter(config.n_splits_for(&scope)).split(&data.timestamps);
        if splits.is_empty() {
            warn!(scope = %scope.key_prefix(), rows = data.len(), "no walk-forward folds, skipping");
            continue;
        }

        let n_sample = ((grid.len() as f64 * config.sample_fraction) as usize).clamp(1, grid.len());
        let sampled = index::sample(&mut rng, grid.len(), n_sample).into_vec();
        info!(
            lookahead = scope.lookahead,
            train = scope.train_length,
            test = scope.test_length,
            params = sampled.len(),
            folds = splits.len(),
            "starting search"
        );

        for (p, &g) in sampled.iter().enumerate() {
            let values = &grid[g];
            let params = config.gbm_params(family, values, num_boost_round);
            let key = run_key(&scope, values);
            let started = Instant::now();

            let mut preds = FoldPredictions {
                by_iteration: vec![Vec::new(); iterations.len()],
                ..FoldPredictions::default()
            };
            let mut importance: Vec<Vec<f64>> = Vec::new();
            for (i, split) in splits.iter().enumerate() {
                let train = data.subset(&split.train_indices);
                let test = data.subset(&split.test_indices);
                let booster = Booster::train(&train, &params)?;
                importance.push(booster.feature_importance());

                let staged = booster.predict_staged(&test.rows, iterations);
                for (column, fold_preds) in preds.by_iteration.iter_mut().zip(staged) {
                    column.extend(fold_preds);
                }
                preds.timestamps.extend_from_slice(&test.timestamps);
                preds.y_test.extend_from_slice(&test.targets);
                preds.fold.extend(std::iter::repeat_n(i, test.len()));
                debug!(key = %key, fold = i, train = train.len(), test = test.len(), "fold done");
            }

            let daily = DailyIcTable::build(&preds.timestamps, &preds.y_test, iterations, &preds.by_iteration);
            let ic: Vec<Option<f64>> = preds
                .by_iteration
                .iter()
                .map(|p| information_coefficient(&preds.y_test, p))
                .collect();
            let seconds = started.elapsed().as_secs_f64();
            elapsed += seconds;

            let run = GbmRunMetrics {
                scope,
                params: values.clone(),
                seconds,
                daily: daily.summary(),
                ic,
            };
            info!("{}", progress_line(p, elapsed, &run));

            store.put_table(&format!("metrics/{}", key), &metrics_table(family, iterations, &run)?)?;
            store.put_table(&format!("daily_ic/{}", key), &daily_ic_table(&daily)?)?;
            store.put_table(
                &format!("fi/{}", key),
                &importance_table(&data.feature_names, &importance)?,
            )?;
            store.put_table(&format!("predictions/{}", key), &predictions_table(iterations, &preds)?)?;
            results.push(run);
        }
    }
    Ok(results)
}

fn progress_line(p: usize, elapsed: f64, run: &GbmRunMetrics) -> String {
    let params: Vec<String> = run.params.iter().map(|&v| format_param(v)).collect();
    let pct = |x: Option<f64>| x.map_or("   n/a".to_string(), |v| format!("{:6.2}%", v * 100.0));
    let (mean, mean_n, median, median_n) = match run.daily {
        Some(d) => (Some(d.mean), d.mean_n.to_string(), Some(d.median), d.median_n.to_string()),
        None => (None, "-".into(), None, "-".into()),
    };
    format!(
        "{:3} | {} ({:3.0}) | {} | {} | {} | {:>4} | {} | {:>4}",
        p,
        format_time(elapsed),
        run.seconds,
        params.join(" | "),
        pct(run.best_ic()),
        pct(mean),
        mean_n,
        pct(median),
        median_n
    )
}

pub const SUMMARY_COLUMNS: [&str; 5] = [
    "t",
    "daily_ic_mean",
    "daily_ic_mean_n",
    "daily_ic_median",
    "daily_ic_median_n",
];

fn metrics_table(
    family: ModelFamily,
    iterations: &[usize],
    run: &GbmRunMetrics,
) -> Result<ResultTable, AlphalabError> {
    let mut columns: Vec<String> = family.param_names().iter().map(|s| s.to_string()).collect();
    columns.extend(SUMMARY_COLUMNS.iter().map(|s| s.to_string()));
    columns.extend(iterations.iter().map(|n| n.to_string()));

    let mut values = run.params.clone();
    values.push(run.seconds);
    match run.daily {
        Some(d) => values.extend([d.mean, d.mean_n as f64, d.median, d.median_n as f64]),
        None => values.extend([f64::NAN; 4]),
    }
    values.extend(run.ic.iter().map(|ic| ic.unwrap_or(f64::NAN)));

    let mut table = ResultTable::new("run", columns);
    table.push_row("metrics", values)?;
    Ok(table)
}

fn daily_ic_table(daily: &DailyIcTable) -> Result<ResultTable, AlphalabError> {
    let columns = daily.iterations.iter().map(|n| n.to_string()).collect();
    let mut table = ResultTable::new("date", columns);
    for (date, row) in daily.dates.iter().zip(&daily.values) {
        table.push_row(
            date.format("%Y-%m-%d").to_string(),
            row.iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        )?;
    }
    Ok(table)
}

/// Per-feature distribution of normalized gain importance across folds.
fn importance_table(features: &[String], per_fold: &[Vec<f64>]) -> Result<ResultTable, AlphalabError> {
    let columns = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
    let mut table = ResultTable::new("feature", columns.iter().map(|c| c.to_string()).collect());
    for (j, name) in features.iter().enumerate() {
        let mut values: Vec<f64> = per_fold.iter().map(|fold| fold[j]).collect();
        values.sort_by(f64::total_cmp);
        let row = if values.is_empty() {
            vec![0.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN]
        } else {
            vec![
                values.len() as f64,
                stats::mean(&values).unwrap_or(f64::NAN),
                stats::std_dev(&values, 1).unwrap_or(f64::NAN),
                values[0],
                stats::quantile_sorted(&values, 0.25),
                stats::quantile_sorted(&values, 0.5),
                stats::quantile_sorted(&values, 0.75),
                values[values.len() - 1],
            ]
        };
        table.push_row(name.clone(), row)?;
    }
    Ok(table)
}

fn predictions_table(iterations: &[usize], preds: &FoldPredictions) -> Result<ResultTable, AlphalabError> {
    let mut columns = vec!["y_test".to_string()];
    columns.extend(iterations.iter().map(|n| n.to_string()));
    columns.push("i".into());

    let mut table = ResultTable::new("date", columns);
    for (r, ts) in preds.timestamps.iter().enumerate() {
        let mut row = vec![preds.y_test[r]];
        row.extend(preds.by_iteration.iter().map(|col| col[r]));
        row.push(preds.fold[r] as f64);
        table.push_row(ts.format(TIMESTAMP_FORMAT).to_string(), row)?;
    }
    Ok(table)
}
