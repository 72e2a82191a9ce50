//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Defaults follow the TA-Lib conventions the feature set was designed
//! against (SMA-seeded EMAs, Wilder smoothing for RSI/ATR, population
//! standard deviation for Bollinger bands).

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod ppo;
pub mod rsi;
pub mod sma;

pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use ppo::calculate_ppo;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Natr(usize),
    Ppo {
        fast: usize,
        slow: usize,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Project each point through `f`, yielding `None` for warmup points.
    pub fn project<F>(&self, f: F) -> Vec<Option<f64>>
    where
        F: Fn(&IndicatorValue) -> f64,
    {
        self.values
            .iter()
            .map(|p| if p.valid { Some(f(&p.value)) } else { None })
            .collect()
    }

    /// Values of a single-output indicator, `None` during warmup.
    pub fn simple_values(&self) -> Vec<Option<f64>> {
        self.project(|v| match v {
            IndicatorValue::Simple(x) => *x,
            IndicatorValue::Macd { line, .. } => *line,
            IndicatorValue::Bollinger { middle, .. } => *middle,
        })
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Natr(period) => write!(f, "NATR({})", period),
            IndicatorType::Ppo { fast, slow } => write!(f, "PPO({},{})", fast, slow),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display_macd() {
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn indicator_type_display_ppo() {
        assert_eq!(IndicatorType::Ppo { fast: 12, slow: 26 }.to_string(), "PPO(12,26)");
    }

    #[test]
    fn simple_values_mask_warmup() {
        let bars = test_bars::from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let series = calculate_sma(&bars, 3);
        assert_eq!(series.simple_values(), vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn project_reads_bollinger_bands() {
        let bars = test_bars::from_closes(&[10.0, 10.0, 10.0]);
        let series = calculate_bollinger(&bars, 2, 200);
        let upper = series.project(|v| match v {
            IndicatorValue::Bollinger { upper, .. } => *upper,
            _ => f64::NAN,
        });
        assert_eq!(upper, vec![None, Some(10.0), Some(10.0)]);
    }
}
