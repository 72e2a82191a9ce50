//! Percentage Price Oscillator.
//!
//! PPO = (SMA(fast) - SMA(slow)) / SMA(slow) * 100, matching the TA-Lib
//! default moving-average type. Warmup: first (slow-1) bars are invalid.

use crate::domain::indicator::{
    calculate_sma, IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;

pub fn calculate_ppo(bars: &[OhlcvBar], fast: usize, slow: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Ppo { fast, slow };
    if fast == 0 || slow == 0 {
        return IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        };
    }

    let fast_ma = calculate_sma(bars, fast).simple_values();
    let slow_ma = calculate_sma(bars, slow).simple_values();

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let ppo = match (fast_ma[i], slow_ma[i]) {
                (Some(f), Some(s)) if s != 0.0 => Some((f - s) / s * 100.0),
                _ => None,
            };
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid: ppo.is_some(),
                value: IndicatorValue::Simple(ppo.unwrap_or(0.0)),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
