//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: slow - 1 + signal - 1 bars. The MACD line itself is valid from
//! bar `slow - 1`; callers that only need the line use [`macd_line`].

use crate::domain::indicator::ema::ema_over;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[OhlcvBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    if bars.is_empty() || fast == 0 || slow == 0 || signal_period == 0 {
        return IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        };
    }

    let line = macd_line(bars, fast, slow);

    // Signal EMA runs over the valid part of the line only.
    let first_valid = line.iter().position(Option::is_some);
    let mut signal_line: Vec<Option<f64>> = vec![None; bars.len()];
    if let Some(start) = first_valid {
        let tail: Vec<f64> = line[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
        for (offset, v) in ema_over(&tail, signal_period).into_iter().enumerate() {
            signal_line[start + offset] = v;
        }
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let (valid, l, s) = match (line[i], signal_line[i]) {
                (Some(l), Some(s)) => (true, l, s),
                (l, _) => (false, l.unwrap_or(0.0), 0.0),
            };
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid,
                value: IndicatorValue::Macd {
                    line: l,
                    signal: s,
                    histogram: l - s,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

pub fn calculate_macd_default(bars: &[OhlcvBar]) -> IndicatorSeries {
    calculate_macd(bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}

/// EMA(fast) - EMA(slow), `None` until both averages are seeded.
pub fn macd_line(bars: &[OhlcvBar], fast: usize, slow: usize) -> Vec<Option<f64>> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_fast = ema_over(&closes, fast);
    let ema_slow = ema_over(&closes, slow);
    ema_fast
        .into_iter()
        .zip(ema_slow)
        .map(|(f, s)| Some(f? - s?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::from_closes;

    fn trending(n: usize) -> Vec<OhlcvBar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        from_closes(&closes)
    }

    #[test]
    fn macd_warmup_default() {
        let series = calculate_macd_default(&trending(40));

        let warmup = DEFAULT_SLOW - 1 + DEFAULT_SIGNAL - 1;
        for i in 0..warmup {
            assert!(!series.values[i].valid, "Index {} should not be valid", i);
        }
        assert!(series.values[warmup].valid, "Index {} should be valid", warmup);
    }

    #[test]
    fn macd_histogram_equals_line_minus_signal() {
        let series = calculate_macd_default(&trending(40));

        for point in series.values.iter().filter(|p| p.valid) {
            if let IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } = point.value
            {
                assert!((histogram - (line - signal)).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn macd_line_valid_from_slow_period() {
        let line = macd_line(&trending(10), 3, 5);
        assert!(line[3].is_none());
        assert!(line[4].is_some());
    }

    #[test]
    fn macd_line_constant_prices_is_zero() {
        let bars = from_closes(&[50.0; 12]);
        for v in macd_line(&bars, 3, 5).into_iter().flatten() {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn macd_empty_bars() {
        assert!(calculate_macd_default(&[]).values.is_empty());
    }

    #[test]
    fn macd_zero_period() {
        let bars = from_closes(&[100.0, 101.0, 102.0]);
        assert!(calculate_macd(&bars, 0, 26, 9).values.is_empty());
        assert!(calculate_macd(&bars, 12, 0, 9).values.is_empty());
        assert!(calculate_macd(&bars, 12, 26, 0).values.is_empty());
    }

    #[test]
    fn macd_custom_parameters() {
        let series = calculate_macd(&trending(20), 5, 10, 3);

        let warmup = 10 - 1 + 3 - 1;
        assert!(!series.values[warmup - 1].valid);
        assert!(series.values[warmup].valid);
    }
}
