//! Live signal generation: turn each new bar into a trading action using an
//! ensemble of trained models.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::AlphalabError;
use crate::domain::features::{build_feature_table, FeatureSpec, FeatureTable};
use crate::domain::gbm::Booster;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::selection::{best_params, IcRecord};
use crate::domain::tuning::{ModelFamily, TuningConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    Nope,
}

impl Action {
    /// Wire name of the action; empty for [`Action::Nope`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::EnterLong => "enter_long",
            Action::EnterShort => "enter_short",
            Action::ExitLong => "exit_long",
            Action::ExitShort => "exit_short",
            Action::Nope => "",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

/// A fitted model scoring one feature row.
pub trait SignalModel {
    fn feature_names(&self) -> &[String];
    fn predict_row(&self, row: &[f64]) -> f64;
}

impl SignalModel for Booster {
    fn feature_names(&self) -> &[String] {
        Booster::feature_names(self)
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.predict(row, None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    /// Bars required before the first signal.
    pub window: usize,
    /// Oldest bars beyond this are discarded.
    pub max_history: usize,
    pub enter_threshold: f64,
    pub exit_threshold: f64,
    pub allow_short: bool,
    pub features: FeatureSpec,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let features = FeatureSpec::default();
        Self {
            window: features.warmup() + 1,
            max_history: 1000,
            enter_threshold: 0.0,
            exit_threshold: 0.0,
            allow_short: true,
            features,
        }
    }
}

/// Map an ensemble prediction to an action given the current direction.
pub fn decide(direction: Direction, prediction: f64, config: &StrategyConfig) -> Action {
    match direction {
        Direction::Flat if prediction > config.enter_threshold => Action::EnterLong,
        Direction::Flat if prediction < -config.enter_threshold && config.allow_short => {
            Action::EnterShort
        }
        Direction::Long if prediction < -config.exit_threshold => Action::ExitLong,
        Direction::Short if prediction > config.enter_threshold.min(config.exit_threshold) => {
            Action::ExitShort
        }
        _ => Action::Nope,
    }
}

fn next_direction(direction: Direction, action: Action) -> Direction {
    match action {
        Action::EnterLong => Direction::Long,
        Action::EnterShort => Direction::Short,
        Action::ExitLong | Action::ExitShort => Direction::Flat,
        Action::Nope => direction,
    }
}

/// Retrain the `count` best parameter sets for `lookahead` on the training
/// window of the most recent walk-forward fold.
pub fn train_ensemble(
    table: &FeatureTable,
    ranked: &[IcRecord],
    lookahead: usize,
    count: usize,
    family: ModelFamily,
    tuning: &TuningConfig,
) -> Result<Vec<Booster>, AlphalabError> {
    let features = table.feature_names();
    let mut models = Vec::new();
    for rank in 0..count {
        let Some(best) = best_params(ranked, lookahead, rank) else {
            break;
        };
        let data = table.select_complete(&features, &best.scope.label())?;
        let split = best
            .scope
            .splitter(1)
            .split(&data.timestamps)
            .into_iter()
            .next()
            .ok_or_else(|| AlphalabError::InsufficientData {
                what: format!("model {}", best.model_key()),
                have: data.len(),
                need: best.scope.train_length + best.scope.test_length,
            })?;
        let train = data.subset(&split.train_indices);
        let params = tuning.gbm_params(family, &best.params, best.boost_rounds);
        debug!(
            rank,
            key = %best.model_key(),
            rounds = best.boost_rounds,
            rows = train.len(),
            "training ensemble member"
        );
        models.push(Booster::train(&train, &params)?);
    }
    if models.is_empty() {
        return Err(AlphalabError::NoData {
            symbol: format!("tuning results for lookahead {}", lookahead),
        });
    }
    Ok(models)
}

pub struct Predictor {
    history: Vec<OhlcvBar>,
    models: Vec<Box<dyn SignalModel>>,
    config: StrategyConfig,
    direction: Direction,
    last_prediction: Option<f64>,
}

impl Predictor {
    pub fn new(
        history: Vec<OhlcvBar>,
        models: Vec<Box<dyn SignalModel>>,
        config: StrategyConfig,
    ) -> Result<Self, AlphalabError> {
        if models.is_empty() {
            return Err(AlphalabError::model("predictor needs at least one model"));
        }
        if config.max_history < config.window {
            return Err(AlphalabError::invalid(
                "strategy",
                "max_history",
                format!("must be at least window ({})", config.window),
            ));
        }
        let mut predictor = Self {
            history,
            models,
            config,
            direction: Direction::Flat,
            last_prediction: None,
        };
        predictor.trim();
        Ok(predictor)
    }

    /// Resume from a previously held position.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Bars currently held, oldest first.
    pub fn history(&self) -> &[OhlcvBar] {
        &self.history
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn last_prediction(&self) -> Option<f64> {
        self.last_prediction
    }

    /// Append `bar` and return the action for it.
    pub fn predict(&mut self, bar: OhlcvBar) -> Result<Action, AlphalabError> {
        self.history.push(bar);
        self.trim();
        if self.history.len() < self.config.window {
            return Ok(Action::Nope);
        }

        let prediction = self.score_latest()?;
        self.last_prediction = Some(prediction);
        let action = decide(self.direction, prediction, &self.config);
        self.direction = next_direction(self.direction, action);
        debug!(prediction, action = %action, "tick");
        Ok(action)
    }

    /// Mean model prediction for the newest bar.
    pub fn score_latest(&self) -> Result<f64, AlphalabError> {
        let table = build_feature_table(&self.history, &self.config.features)?;
        let mut total = 0.0;
        for model in &self.models {
            let row = table.last_row(model.feature_names())?;
            total += model.predict_row(&row);
        }
        Ok(total / self.models.len() as f64)
    }

    fn trim(&mut self) {
        let excess = self.history.len().saturating_sub(self.config.max_history);
        if excess > 0 {
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::from_closes;

    /// Predicts the last 1-bar return.
    struct Momentum {
        names: Vec<String>,
        scale: f64,
    }

    impl SignalModel for Momentum {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_row(&self, row: &[f64]) -> f64 {
            row[0] * self.scale
        }
    }

    fn momentum(scale: f64) -> Box<dyn SignalModel> {
        Box::new(Momentum {
            names: vec!["r01".into()],
            scale,
        })
    }

    fn config(window: usize) -> StrategyConfig {
        StrategyConfig {
            window,
            max_history: 50,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn action_wire_names() {
        assert_eq!(Action::EnterLong.to_string(), "enter_long");
        assert_eq!(Action::ExitShort.as_str(), "exit_short");
        assert_eq!(Action::Nope.to_string(), "");
    }

    #[test]
    fn decide_applies_hysteresis() {
        let cfg = StrategyConfig {
            enter_threshold: 0.01,
            exit_threshold: 0.0,
            ..StrategyConfig::default()
        };
        assert_eq!(decide(Direction::Flat, 0.02, &cfg), Action::EnterLong);
        assert_eq!(decide(Direction::Flat, 0.005, &cfg), Action::Nope);
        assert_eq!(decide(Direction::Flat, -0.02, &cfg), Action::EnterShort);
        assert_eq!(decide(Direction::Long, 0.02, &cfg), Action::Nope);
        assert_eq!(decide(Direction::Long, -0.001, &cfg), Action::ExitLong);
        assert_eq!(decide(Direction::Short, 0.001, &cfg), Action::ExitShort);

        // a short also closes once the prediction clears the entry threshold
        let wide_exit = StrategyConfig {
            enter_threshold: 0.01,
            exit_threshold: 0.05,
            ..StrategyConfig::default()
        };
        assert_eq!(decide(Direction::Short, 0.02, &wide_exit), Action::ExitShort);
        assert_eq!(decide(Direction::Short, 0.005, &wide_exit), Action::Nope);
        assert_eq!(decide(Direction::Long, -0.02, &wide_exit), Action::Nope);
        assert_eq!(decide(Direction::Long, -0.06, &wide_exit), Action::ExitLong);

        let long_only = StrategyConfig {
            allow_short: false,
            ..cfg
        };
        assert_eq!(decide(Direction::Flat, -0.02, &long_only), Action::Nope);
    }

    #[test]
    fn waits_for_window() {
        let bars = from_closes(&[100.0, 101.0, 102.0]);
        let mut p = Predictor::new(Vec::new(), vec![momentum(1.0)], config(3)).unwrap();
        assert_eq!(p.predict(bars[0].clone()).unwrap(), Action::Nope);
        assert_eq!(p.predict(bars[1].clone()).unwrap(), Action::Nope);
        assert!(p.last_prediction().is_none());
        assert_eq!(p.predict(bars[2].clone()).unwrap(), Action::EnterLong);
        assert_eq!(p.direction(), Direction::Long);
    }

    #[test]
    fn enters_short_on_negative_signal() {
        let bars = from_closes(&[100.0, 101.0, 102.0, 100.0, 98.0, 96.0]);
        let mut p = Predictor::new(bars[..3].to_vec(), vec![momentum(1.0)], config(3)).unwrap();

        assert_eq!(p.predict(bars[3].clone()).unwrap(), Action::EnterShort);
        assert_eq!(p.predict(bars[4].clone()).unwrap(), Action::Nope);
        assert_eq!(p.direction(), Direction::Short);
    }

    #[test]
    fn resumes_held_position() {
        let bars = from_closes(&[100.0, 101.0, 102.0, 103.0]);
        let mut p = Predictor::new(bars[..3].to_vec(), vec![momentum(1.0)], config(3))
            .unwrap()
            .with_direction(Direction::Short);
        assert_eq!(p.predict(bars[3].clone()).unwrap(), Action::ExitShort);
        assert_eq!(p.direction(), Direction::Flat);
    }

    #[test]
    fn averages_models() {
        let bars = from_closes(&[100.0, 110.0]);
        let p = Predictor::new(bars, vec![momentum(1.0), momentum(3.0)], config(2)).unwrap();
        let score = p.score_latest().unwrap();
        assert!((score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn history_is_bounded() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let bars = from_closes(&closes);
        let mut p = Predictor::new(bars[..60].to_vec(), vec![momentum(1.0)], config(3)).unwrap();
        assert_eq!(p.history().len(), 50);
        p.predict(bars[60].clone()).unwrap();
        assert_eq!(p.history().len(), 50);
    }

    fn wavy_bars(n: usize) -> Vec<OhlcvBar> {
        let start = chrono::NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 4.0 + i as f64 * 0.05;
                OhlcvBar {
                    symbol: "BTCUSDT".into(),
                    timestamp: start + chrono::Duration::days(i as i64),
                    open: close - 0.3,
                    high: close + 1.0 + (i % 3) as f64 * 0.2,
                    low: close - 1.0,
                    close,
                    volume: 500.0 + (i % 7) as f64 * 40.0,
                }
            })
            .collect()
    }

    #[test]
    fn trains_top_ranked_models() {
        let table = build_feature_table(&wavy_bars(160), &FeatureSpec::default()).unwrap();
        let scope = crate::domain::tuning::CvScope {
            lookahead: 1,
            train_length: 30,
            test_length: 5,
        };
        let ranked = vec![
            IcRecord {
                scope,
                params: vec![0.1, 4.0, 1.0, 5.0],
                boost_rounds: 5,
                ic: 0.1,
            },
            IcRecord {
                scope,
                params: vec![0.3, 8.0, 1.0, 5.0],
                boost_rounds: 10,
                ic: 0.2,
            },
        ];
        let models = train_ensemble(
            &table,
            &ranked,
            1,
            3,
            ModelFamily::LightGbm,
            &TuningConfig::default(),
        )
        .unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].num_trees(), 10);
        assert_eq!(models[1].num_trees(), 5);

        let boxed: Vec<Box<dyn SignalModel>> =
            models.into_iter().map(|m| Box::new(m) as Box<dyn SignalModel>).collect();
        let p = Predictor::new(wavy_bars(160), boxed, StrategyConfig::default()).unwrap();
        assert!(p.score_latest().unwrap().is_finite());

        assert!(train_ensemble(
            &table,
            &ranked,
            21,
            3,
            ModelFamily::LightGbm,
            &TuningConfig::default()
        )
        .is_err());
    }

    #[test]
    fn rejects_empty_ensemble() {
        assert!(Predictor::new(Vec::new(), Vec::new(), config(3)).is_err());
        let bad = StrategyConfig {
            window: 10,
            max_history: 5,
            ..StrategyConfig::default()
        };
        assert!(Predictor::new(Vec::new(), vec![momentum(1.0)], bad).is_err());
    }
}
