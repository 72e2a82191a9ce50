#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use alphalab::domain::error::AlphalabError;
pub use alphalab::domain::ohlcv::OhlcvBar;
use alphalab::domain::results::ResultTable;
use alphalab::ports::data_port::MarketDataPort;
use alphalab::ports::store_port::ResultStore;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SYMBOL: &str = "BTCUSDT";

pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// 6-hourly bars whose returns carry some autocorrelation, reproducible per seed.
pub fn synthetic_bars(start: NaiveDateTime, count: usize, seed: u64) -> Vec<OhlcvBar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = 30_000.0;
    let mut last_ret = 0.0;
    (0..count)
        .map(|i| {
            let ret = 0.3 * last_ret + rng.gen_range(-0.01..0.01);
            last_ret = ret;
            let open = close;
            close = open * (1.0 + ret);
            let wiggle = rng.gen_range(0.0..0.005);
            OhlcvBar {
                symbol: SYMBOL.to_string(),
                timestamp: start + Duration::hours(6 * i as i64),
                open,
                high: open.max(close) * (1.0 + wiggle),
                low: open.min(close) * (1.0 - wiggle),
                close,
                volume: rng.gen_range(100.0..1_000.0),
            }
        })
        .collect()
}

pub fn make_bar(timestamp: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: SYMBOL.to_string(),
        timestamp: NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").unwrap(),
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 500.0,
    }
}

pub struct MockDataPort {
    pub data: BTreeMap<String, Vec<OhlcvBar>>,
    pub errors: BTreeMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl MarketDataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _interval: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, AlphalabError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(AlphalabError::DataSource {
                reason: reason.clone(),
            });
        }
        let bars: Vec<OhlcvBar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date() >= start && b.date() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(AlphalabError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub tables: BTreeMap<String, ResultTable>,
}

impl ResultStore for MemoryStore {
    fn put_table(&mut self, key: &str, table: &ResultTable) -> Result<(), AlphalabError> {
        self.tables.insert(key.to_string(), table.clone());
        Ok(())
    }

    fn get_table(&self, key: &str) -> Result<ResultTable, AlphalabError> {
        self.tables.get(key).cloned().ok_or_else(|| AlphalabError::Store {
            reason: format!("no table under key {}", key),
        })
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, AlphalabError> {
        Ok(self
            .tables
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// A complete pipeline config rooted at `dir`, with a search small enough
/// to run in a test.
pub fn pipeline_ini(dir: &Path) -> String {
    let d = dir.display();
    format!(
        r#"
[data]
symbol = {SYMBOL}
interval = 6h
start_date = 2021-01-01
end_date = 2021-12-31
ohlcv_path = {d}/data/ohlcv.tsv
features_path = {d}/data/features.csv
results_dir = {d}/results

[features]
forward_periods = 1, 5

[tuning]
lookaheads = 1
train_lengths = 200
test_lengths = 50
n_splits = 2
learning_rates = 0.1
max_depths = 2
feature_fractions = 0.95
min_data_in_leaf = 20
catboost_depths = 2
catboost_min_child_samples = 20
num_iterations = 5, 10
sample_fraction = 1.0
seed = 7
start_date = 2021-01-01
end_date = 2021-12-31

[evaluation]
model = lgb
lookahead = 1
top_n = 2
average_top = 1
quantiles = 3
periods = 1, 5
rolling_window = 2
report_path = {d}/reports/sheet.typ

[strategy]
models_dir = {d}/models
model = lgb
lookahead = 1
num_models = 1
enter_threshold = 0.0
max_history = 400

[logging]
level = warn
"#
    )
}
