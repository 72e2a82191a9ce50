//! CLI definition and dispatch.
//!
//! Each subcommand is one pipeline stage. The stage functions take their
//! collaborators as port trait objects so they can be driven from tests;
//! `run` loads the config file, installs logging and maps
//! errors to exit codes.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use crate::adapters::binance_adapter::BinanceAdapter;
use crate::adapters::csv_adapter::{read_feature_table, read_ohlcv, write_feature_table, write_ohlcv};
use crate::adapters::csv_store::CsvResultStore;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::model_store::ModelStore;
use crate::adapters::typst_report::TypstReportAdapter;
use crate::domain::config_validation::{
    load_evaluation_config, load_export_config, load_feature_spec, load_pipeline_config,
    load_strategy_config, load_tuning_config, log_level, validate_all,
};
use crate::domain::error::AlphalabError;
use crate::domain::factor::{FactorData, FactorObservation, PriceHistory, TearSheet};
use crate::domain::features::{build_feature_table, FeatureTable};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::selection::{
    aggregate_daily_ic, best_params, ensemble_predictions, hyperparameter_impact, load_daily_ic,
    load_metrics, model_key, rolling_ic, select_daily_ic, top_n_by_lookahead,
};
use crate::domain::strategy::{train_ensemble, Action, Direction, Predictor, SignalModel};
use crate::domain::tuning::{
    best_linear_by_lookahead, linear_metrics_table, run_gbm_search, run_linear_baseline,
    ModelFamily, TIMESTAMP_FORMAT,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::report_port::{ReportPort, ReportSummary};
use crate::ports::store_port::ResultStore;

#[derive(Parser, Debug)]
#[command(name = "alphalab", about = "Alpha factor research pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download OHLCV bars from the exchange
    Download {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Compute features and forward-return labels
    Features {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Walk-forward hyperparameter search
    Tune {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, value_enum)]
        model: TuneModel,
    },
    /// Select the best models and write a factor tear sheet
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Retrain the best models and save them for prediction
    ExportModels {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Feed new bars to the exported models and print one action per bar
    Predict {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TuneModel {
    Linear,
    Lgb,
    Catboost,
}

impl TuneModel {
    fn family(self) -> Option<ModelFamily> {
        match self {
            TuneModel::Linear => None,
            TuneModel::Lgb => Some(ModelFamily::LightGbm),
            TuneModel::Catboost => Some(ModelFamily::CatBoost),
        }
    }
}

/// Directory of the linear baseline's result store under `results_dir`.
pub const LINEAR_STORE: &str = "linear_regression";

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Download { config } => run_stage(&config, |adapter| {
            let bars = download_stage(adapter, &BinanceAdapter::new())?;
            eprintln!("Downloaded {} bars", bars.len());
            Ok(())
        }),
        Command::Features { config } => run_stage(&config, |adapter| {
            let table = features_stage(adapter)?;
            eprintln!(
                "Computed {} rows, {} features, {} labels",
                table.len(),
                table.feature_names().len(),
                table.label_names().len()
            );
            Ok(())
        }),
        Command::Tune { config, model } => run_stage(&config, |adapter| tune_stage(adapter, model)),
        Command::Evaluate {
            config,
            output,
            template,
        } => run_stage(&config, |adapter| {
            evaluate_stage(adapter, template.as_deref(), output.as_deref()).map(|_| ())
        }),
        Command::ExportModels { config } => run_stage(&config, |adapter| {
            let count = export_stage(adapter)?;
            eprintln!("Exported {} models", count);
            Ok(())
        }),
        Command::Predict { config, bars } => run_stage(&config, |adapter| {
            for (timestamp, action) in predict_stage(adapter, &bars)? {
                let label = if action == Action::Nope { "-" } else { action.as_str() };
                println!("{}\t{}", timestamp.format(TIMESTAMP_FORMAT), label);
            }
            Ok(())
        }),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn run_stage<F>(config_path: &Path, stage: F) -> ExitCode
where
    F: FnOnce(&dyn ConfigPort) -> Result<(), AlphalabError>,
{
    let file_adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let adapter: &dyn ConfigPort = &file_adapter;
    let result = log_level(adapter).and_then(|level| {
        crate::logging::init(&level);
        stage(adapter)
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    eprintln!("Configuration is valid.");
    ExitCode::SUCCESS
}

/// Fetch the configured market and write it to the OHLCV file.
pub fn download_stage(
    config: &dyn ConfigPort,
    port: &dyn MarketDataPort,
) -> Result<Vec<OhlcvBar>, AlphalabError> {
    let pipeline = load_pipeline_config(config)?;
    info!(
        symbol = %pipeline.symbol,
        interval = %pipeline.interval,
        start = %pipeline.start,
        end = %pipeline.end,
        "downloading"
    );
    let bars = port.fetch_ohlcv(&pipeline.symbol, &pipeline.interval, pipeline.start, pipeline.end)?;
    write_ohlcv(&pipeline.ohlcv_path, &bars)?;
    info!(path = %pipeline.ohlcv_path.display(), rows = bars.len(), "wrote OHLCV");
    Ok(bars)
}

/// Read the OHLCV file and write the feature/label table.
pub fn features_stage(config: &dyn ConfigPort) -> Result<FeatureTable, AlphalabError> {
    let pipeline = load_pipeline_config(config)?;
    let spec = load_feature_spec(config)?;
    let bars = read_ohlcv(&pipeline.ohlcv_path, &pipeline.symbol)?;
    if bars.is_empty() {
        return Err(AlphalabError::NoData {
            symbol: pipeline.symbol,
        });
    }
    let table = build_feature_table(&bars, &spec)?;
    write_feature_table(&pipeline.features_path, &table)?;
    info!(
        path = %pipeline.features_path.display(),
        rows = table.len(),
        columns = table.columns.len(),
        "wrote features"
    );
    Ok(table)
}

pub fn tune_stage(config: &dyn ConfigPort, model: TuneModel) -> Result<(), AlphalabError> {
    let pipeline = load_pipeline_config(config)?;
    let tuning = load_tuning_config(config)?;
    let table = read_feature_table(&pipeline.features_path)?;

    let Some(family) = model.family() else {
        let metrics = run_linear_baseline(&table, &tuning)?;
        let mut store = CsvResultStore::new(pipeline.results_dir.join(LINEAR_STORE));
        store.put_table("metrics", &linear_metrics_table(&metrics)?)?;

        eprintln!("\nBest linear scopes by lookahead:");
        eprintln!("  {:>4} {:>6} {:>5} {:>10} {:>8}", "t", "train", "test", "ic_by_day", "ic");
        for m in best_linear_by_lookahead(&metrics, 5) {
            eprintln!(
                "  {:>4} {:>6} {:>5} {:>10} {:>8}",
                m.scope.lookahead,
                m.scope.train_length,
                m.scope.test_length,
                fmt_opt(m.ic_by_day),
                fmt_opt(m.ic)
            );
        }
        return Ok(());
    };

    let mut store = CsvResultStore::new(pipeline.results_dir.join(family.store_name()));
    let runs = run_gbm_search(&table, &tuning, family, &mut store)?;
    info!(
        runs = runs.len(),
        store = %store.root().display(),
        "search finished"
    );
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}

/// Rank stored runs, combine the best models' predictions into a factor and
/// write its tear sheet.
pub fn evaluate_stage(
    config: &dyn ConfigPort,
    template: Option<&Path>,
    output: Option<&Path>,
) -> Result<TearSheet, AlphalabError> {
    let pipeline = load_pipeline_config(config)?;
    let eval = load_evaluation_config(config)?;
    let store = CsvResultStore::new(pipeline.results_dir.join(eval.family.store_name()));

    let metrics = load_metrics(&store, eval.family)?;
    print_top_runs(
        "overall IC",
        &top_n_by_lookahead(&metrics, eval.top_n, |m| m.scope.lookahead, |m| m.ic)
            .iter()
            .map(|m| (m.scope.lookahead, m.boost_rounds, m.ic, model_key(&m.scope, &m.params)))
            .collect::<Vec<_>>(),
    );

    let daily = load_daily_ic(&store, eval.family)?;
    let ranked = aggregate_daily_ic(&daily);
    print_top_runs(
        "mean daily IC",
        &top_n_by_lookahead(&ranked, eval.top_n, |r| r.scope.lookahead, |r| r.ic)
            .iter()
            .map(|r| (r.scope.lookahead, r.boost_rounds, r.ic, r.model_key()))
            .collect::<Vec<_>>(),
    );

    let best = best_params(&ranked, eval.lookahead, 0).ok_or_else(|| AlphalabError::NoData {
        symbol: format!("tuning results for lookahead {}", eval.lookahead),
    })?;
    let roll = rolling_ic(&select_daily_ic(&daily, &best), eval.rolling_window);

    match hyperparameter_impact(&daily, eval.lookahead, eval.family) {
        Ok(coefs) => {
            eprintln!("\nHyperparameter impact on daily IC (lookahead {}):", eval.lookahead);
            eprintln!("  {:<28} {:>10} {:>8} {:>8}", "variable", "coef", "t", "p");
            for c in coefs {
                eprintln!("  {:<28} {:>10.5} {:>8.2} {:>8.3}", c.variable, c.coef, c.t, c.p_value);
            }
        }
        Err(e) => warn!(error = %e, "skipping hyperparameter impact"),
    }

    let ensemble = ensemble_predictions(&store, &ranked, eval.lookahead, eval.top_n, eval.average_top)?;
    let factor: Vec<FactorObservation> = ensemble
        .timestamps
        .iter()
        .zip(&ensemble.factor)
        .map(|(&timestamp, &value)| FactorObservation {
            timestamp,
            asset: pipeline.symbol.clone(),
            value,
        })
        .collect();

    let bars = read_ohlcv(&pipeline.ohlcv_path, &pipeline.symbol)?;
    let mut prices = PriceHistory::new();
    prices.insert(
        pipeline.symbol.clone(),
        bars.iter().map(|b| (b.timestamp, b.close)).collect(),
    );

    let data = FactorData::build(&factor, &prices, eval.quantiles, &eval.periods)?;
    let sheet = TearSheet::from_factor_data(&data);
    let summary = ReportSummary {
        title: format!("{} {}", pipeline.symbol, pipeline.interval),
        lookahead: eval.lookahead,
        model_keys: ensemble.model_keys.clone(),
        rolling_ic: roll.rolling,
        ic_mean: roll.mean,
        ic_median: roll.median,
    };

    let template = template
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("evaluation", "template_path").map(PathBuf::from));
    let report_path = output.map_or(eval.report_path, Path::to_path_buf);
    TypstReportAdapter::new(template).write(&sheet, &summary, &report_path)?;
    eprintln!("Tear sheet written to {}", report_path.display());
    Ok(sheet)
}

fn print_top_runs(by: &str, rows: &[(usize, usize, f64, String)]) {
    eprintln!("\nTop runs by {}:", by);
    eprintln!("  {:>4} {:>6} {:>8}  model", "t", "rounds", "ic");
    for (lookahead, rounds, ic, key) in rows {
        eprintln!("  {:>4} {:>6} {:>8.4}  {}", lookahead, rounds, ic, key);
    }
}

/// Retrain the best ranked models and persist them with the bar history
/// the predictor needs to warm up.
pub fn export_stage(config: &dyn ConfigPort) -> Result<usize, AlphalabError> {
    let pipeline = load_pipeline_config(config)?;
    let export = load_export_config(config)?;
    let tuning = load_tuning_config(config)?;
    let strategy = load_strategy_config(config)?;

    let store = CsvResultStore::new(pipeline.results_dir.join(export.family.store_name()));
    let ranked = aggregate_daily_ic(&load_daily_ic(&store, export.family)?);
    let table = read_feature_table(&pipeline.features_path)?;
    let models = train_ensemble(
        &table,
        &ranked,
        export.lookahead,
        export.num_models,
        export.family,
        &tuning,
    )?;

    let bars = read_ohlcv(&pipeline.ohlcv_path, &pipeline.symbol)?;
    let keep = bars.len().saturating_sub(strategy.max_history);

    let model_store = ModelStore::new(pipeline.models_dir);
    model_store.save_models(&models)?;
    model_store.save_history(&bars[keep..])?;
    model_store.save_direction(Direction::Flat)?;
    Ok(models.len())
}

/// Score each bar of `bars_path` newer than the saved history, in order.
pub fn predict_stage(
    config: &dyn ConfigPort,
    bars_path: &Path,
) -> Result<Vec<(NaiveDateTime, Action)>, AlphalabError> {
    let pipeline = load_pipeline_config(config)?;
    let strategy = load_strategy_config(config)?;
    let model_store = ModelStore::new(pipeline.models_dir);

    let models: Vec<Box<dyn SignalModel>> = model_store
        .load_models()?
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn SignalModel>)
        .collect();
    let history = model_store.load_history(&pipeline.symbol)?;
    let last_seen = history.last().map(|b| b.timestamp);
    let mut predictor = Predictor::new(history, models, strategy)?
        .with_direction(model_store.load_direction()?);

    let mut actions = Vec::new();
    for bar in read_ohlcv(bars_path, &pipeline.symbol)? {
        if last_seen.is_some_and(|t| bar.timestamp <= t) {
            continue;
        }
        let timestamp = bar.timestamp;
        let action = predictor.predict(bar)?;
        actions.push((timestamp, action));
    }

    model_store.save_history(predictor.history())?;
    model_store.save_direction(predictor.direction())?;
    info!(bars = actions.len(), direction = ?predictor.direction(), "prediction done");
    Ok(actions)
}
