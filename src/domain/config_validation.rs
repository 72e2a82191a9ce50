//! Typed configuration loaded from a [`ConfigPort`].
//!
//! Every loader validates its section and reports the first offending key as
//! `ConfigMissing` or `ConfigInvalid`.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::error::AlphalabError;
use crate::domain::features::FeatureSpec;
use crate::domain::strategy::StrategyConfig;
use crate::domain::tuning::{ModelFamily, TuningConfig};
use crate::ports::config_port::ConfigPort;

/// Where the pipeline reads and writes, and which market it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub symbol: String,
    pub interval: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub ohlcv_path: PathBuf,
    pub features_path: PathBuf,
    pub results_dir: PathBuf,
    pub models_dir: PathBuf,
}

/// Model selection and tear-sheet settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    pub family: ModelFamily,
    pub lookahead: usize,
    pub top_n: usize,
    pub average_top: usize,
    pub quantiles: usize,
    pub periods: Vec<usize>,
    pub rolling_window: usize,
    pub report_path: PathBuf,
}

/// Which models `export-models` retrains.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub family: ModelFamily,
    pub lookahead: usize,
    pub num_models: usize,
}

pub fn load_pipeline_config(config: &dyn ConfigPort) -> Result<PipelineConfig, AlphalabError> {
    let symbol = required_string(config, "data", "symbol")?;
    let interval = config
        .get_string("data", "interval")
        .unwrap_or_else(|| "6h".to_string());
    validate_interval(&interval)?;

    let start = parse_date(config, "data", "start_date")?;
    let end = parse_date(config, "data", "end_date")?;
    if start >= end {
        return Err(AlphalabError::invalid(
            "data",
            "start_date",
            "start_date must be before end_date",
        ));
    }

    Ok(PipelineConfig {
        symbol,
        interval,
        start,
        end,
        ohlcv_path: path_or(config, "data", "ohlcv_path", "data/ohlcv.tsv"),
        features_path: path_or(config, "data", "features_path", "data/features.csv"),
        results_dir: path_or(config, "data", "results_dir", "results"),
        models_dir: path_or(config, "strategy", "models_dir", "models"),
    })
}

pub fn load_feature_spec(config: &dyn ConfigPort) -> Result<FeatureSpec, AlphalabError> {
    let defaults = FeatureSpec::default();
    let spec = FeatureSpec {
        return_periods: list_or(config, "features", "return_periods", defaults.return_periods)?,
        forward_periods: list_or(config, "features", "forward_periods", defaults.forward_periods)?,
        dollar_volume_window: positive(
            config,
            "features",
            "dollar_volume_window",
            defaults.dollar_volume_window,
        )?,
        rsi_period: positive(config, "features", "rsi_period", defaults.rsi_period)?,
        bollinger_period: positive(config, "features", "bollinger_period", defaults.bollinger_period)?,
        atr_period: positive(config, "features", "atr_period", defaults.atr_period)?,
        return_buckets: positive(config, "features", "return_buckets", defaults.return_buckets)?,
    };
    if spec.return_periods.contains(&0) || spec.forward_periods.contains(&0) {
        return Err(AlphalabError::invalid(
            "features",
            "return_periods",
            "periods must be positive",
        ));
    }
    if spec.forward_periods.is_empty() {
        return Err(AlphalabError::invalid(
            "features",
            "forward_periods",
            "at least one forward period required",
        ));
    }
    Ok(spec)
}

pub fn load_tuning_config(config: &dyn ConfigPort) -> Result<TuningConfig, AlphalabError> {
    let d = TuningConfig::default();
    let n_splits = match config.get_string("tuning", "n_splits") {
        Some(_) => Some(positive(config, "tuning", "n_splits", 1)?),
        None => d.n_splits,
    };
    let start = match config.get_string("tuning", "start_date") {
        Some(_) => Some(parse_date(config, "tuning", "start_date")?),
        None => d.start,
    };
    let end = match config.get_string("tuning", "end_date") {
        Some(_) => Some(parse_date(config, "tuning", "end_date")?),
        None => d.end,
    };

    let tuning = TuningConfig {
        lookaheads: list_or(config, "tuning", "lookaheads", d.lookaheads)?,
        train_lengths: list_or(config, "tuning", "train_lengths", d.train_lengths)?,
        test_lengths: list_or(config, "tuning", "test_lengths", d.test_lengths)?,
        n_splits,
        learning_rates: list_or(config, "tuning", "learning_rates", d.learning_rates)?,
        max_depths: list_or(config, "tuning", "max_depths", d.max_depths)?,
        feature_fractions: list_or(config, "tuning", "feature_fractions", d.feature_fractions)?,
        min_data_in_leaf: list_or(config, "tuning", "min_data_in_leaf", d.min_data_in_leaf)?,
        catboost_depths: list_or(config, "tuning", "catboost_depths", d.catboost_depths)?,
        catboost_min_child_samples: list_or(
            config,
            "tuning",
            "catboost_min_child_samples",
            d.catboost_min_child_samples,
        )?,
        catboost_learning_rate: config.get_double(
            "tuning",
            "catboost_learning_rate",
            d.catboost_learning_rate,
        ),
        num_iterations: list_or(config, "tuning", "num_iterations", d.num_iterations)?,
        sample_fraction: config.get_double("tuning", "sample_fraction", d.sample_fraction),
        seed: config.get_int("tuning", "seed", d.seed as i64).max(0) as u64,
        start,
        end,
        categoricals: list_or(config, "tuning", "categoricals", d.categoricals)?,
    };
    validate_tuning(&tuning)?;
    Ok(tuning)
}

fn validate_tuning(t: &TuningConfig) -> Result<(), AlphalabError> {
    let non_empty: [(&str, bool); 5] = [
        ("lookaheads", t.lookaheads.is_empty()),
        ("train_lengths", t.train_lengths.is_empty()),
        ("test_lengths", t.test_lengths.is_empty()),
        ("num_iterations", t.num_iterations.is_empty()),
        ("learning_rates", t.learning_rates.is_empty()),
    ];
    for (key, empty) in non_empty {
        if empty {
            return Err(AlphalabError::invalid("tuning", key, "at least one value required"));
        }
    }
    if t.lookaheads.contains(&0) || t.test_lengths.contains(&0) || t.num_iterations.contains(&0) {
        return Err(AlphalabError::invalid(
            "tuning",
            "lookaheads",
            "lookaheads, test_lengths and num_iterations must be positive",
        ));
    }
    if t.learning_rates.iter().any(|&lr| lr <= 0.0) || t.catboost_learning_rate <= 0.0 {
        return Err(AlphalabError::invalid(
            "tuning",
            "learning_rates",
            "learning rates must be positive",
        ));
    }
    if t.feature_fractions.iter().any(|&f| f <= 0.0 || f > 1.0) {
        return Err(AlphalabError::invalid(
            "tuning",
            "feature_fractions",
            "feature fractions must be in (0, 1]",
        ));
    }
    if t.sample_fraction <= 0.0 || t.sample_fraction > 1.0 {
        return Err(AlphalabError::invalid(
            "tuning",
            "sample_fraction",
            "sample_fraction must be in (0, 1]",
        ));
    }
    if let (Some(start), Some(end)) = (t.start, t.end) {
        if start >= end {
            return Err(AlphalabError::invalid(
                "tuning",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

pub fn load_evaluation_config(config: &dyn ConfigPort) -> Result<EvaluationConfig, AlphalabError> {
    let family = parse_family(config, "evaluation")?;
    let top_n = positive(config, "evaluation", "top_n", 10)?;
    let average_top = positive(config, "evaluation", "average_top", 5)?;
    if average_top > top_n {
        return Err(AlphalabError::invalid(
            "evaluation",
            "average_top",
            "average_top must not exceed top_n",
        ));
    }
    let quantiles = positive(config, "evaluation", "quantiles", 5)?;
    if quantiles < 2 {
        return Err(AlphalabError::invalid(
            "evaluation",
            "quantiles",
            "quantiles must be at least 2",
        ));
    }
    let periods = list_or(config, "evaluation", "periods", vec![1, 5, 10, 21])?;
    if periods.is_empty() || periods.contains(&0) {
        return Err(AlphalabError::invalid(
            "evaluation",
            "periods",
            "periods must be positive",
        ));
    }

    Ok(EvaluationConfig {
        family,
        lookahead: positive(config, "evaluation", "lookahead", 1)?,
        top_n,
        average_top,
        quantiles,
        periods,
        rolling_window: positive(config, "evaluation", "rolling_window", 3)?,
        report_path: path_or(config, "evaluation", "report_path", "reports/tear_sheet.typ"),
    })
}

pub fn load_export_config(config: &dyn ConfigPort) -> Result<ExportConfig, AlphalabError> {
    Ok(ExportConfig {
        family: parse_family(config, "strategy")?,
        lookahead: positive(config, "strategy", "lookahead", 21)?,
        num_models: positive(config, "strategy", "num_models", 3)?,
    })
}

pub fn load_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, AlphalabError> {
    let features = load_feature_spec(config)?;
    let default_window = features.warmup() + 1;
    let window = positive(config, "strategy", "window", default_window)?;
    let max_history = positive(config, "strategy", "max_history", window.max(1000))?;
    if max_history < window {
        return Err(AlphalabError::invalid(
            "strategy",
            "max_history",
            "max_history must be at least window",
        ));
    }

    let enter_threshold = config.get_double("strategy", "enter_threshold", 0.0);
    let exit_threshold = config.get_double("strategy", "exit_threshold", enter_threshold);
    if enter_threshold < 0.0 || exit_threshold < 0.0 {
        return Err(AlphalabError::invalid(
            "strategy",
            "enter_threshold",
            "thresholds must be non-negative",
        ));
    }

    Ok(StrategyConfig {
        window,
        max_history,
        enter_threshold,
        exit_threshold,
        allow_short: config.get_bool("strategy", "allow_short", true),
        features,
    })
}

/// Log filter directive from `[logging] level`, `info` when unset.
pub fn log_level(config: &dyn ConfigPort) -> Result<String, AlphalabError> {
    let level = config
        .get_string("logging", "level")
        .unwrap_or_else(|| "info".to_string())
        .to_lowercase();
    match level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" | "off" => Ok(level),
        _ => Err(AlphalabError::invalid(
            "logging",
            "level",
            format!("unknown level {}", level),
        )),
    }
}

/// Load every section once, surfacing the first error.
pub fn validate_all(config: &dyn ConfigPort) -> Result<(), AlphalabError> {
    load_pipeline_config(config)?;
    load_feature_spec(config)?;
    load_tuning_config(config)?;
    load_evaluation_config(config)?;
    load_export_config(config)?;
    load_strategy_config(config)?;
    log_level(config)?;
    Ok(())
}

pub fn parse_model_family(value: &str) -> Option<ModelFamily> {
    match value.trim().to_lowercase().as_str() {
        "lgb" | "lightgbm" => Some(ModelFamily::LightGbm),
        "catboost" | "cb" => Some(ModelFamily::CatBoost),
        _ => None,
    }
}

fn parse_family(config: &dyn ConfigPort, section: &str) -> Result<ModelFamily, AlphalabError> {
    match config.get_string(section, "model") {
        None => Ok(ModelFamily::LightGbm),
        Some(s) => parse_model_family(&s).ok_or_else(|| {
            AlphalabError::invalid(section, "model", format!("unknown model family {}", s))
        }),
    }
}

fn validate_interval(interval: &str) -> Result<(), AlphalabError> {
    let split = interval.char_indices().last().map(|(i, _)| interval.split_at(i));
    let valid = split.is_some_and(|(count, unit)| {
        matches!(unit, "m" | "h" | "d" | "w" | "M") && count.parse::<u32>().is_ok_and(|n| n > 0)
    });
    if valid {
        Ok(())
    } else {
        Err(AlphalabError::invalid(
            "data",
            "interval",
            format!("invalid interval {}, expected e.g. 6h or 1d", interval),
        ))
    }
}

fn required_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, AlphalabError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(AlphalabError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn parse_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, AlphalabError> {
    let value = required_string(config, section, key)?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
        AlphalabError::invalid(section, key, format!("invalid {} format, expected YYYY-MM-DD", key))
    })
}

fn path_or(config: &dyn ConfigPort, section: &str, key: &str, default: &str) -> PathBuf {
    PathBuf::from(
        config
            .get_string(section, key)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default.to_string()),
    )
}

fn positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, AlphalabError> {
    let value = config.get_int(section, key, default as i64);
    if value < 1 {
        return Err(AlphalabError::invalid(
            section,
            key,
            format!("{} must be at least 1", key),
        ));
    }
    Ok(value as usize)
}

/// Comma-separated list, `default` when the key is absent.
fn list_or<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Vec<T>,
) -> Result<Vec<T>, AlphalabError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(default);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| AlphalabError::invalid(section, key, format!("cannot parse {:?}", s)))
        })
        .collect()
}
