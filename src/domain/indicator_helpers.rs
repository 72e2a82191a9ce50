//! Range-based indicators shared by the feature pipeline.
//!
//! ATR follows the TA-Lib convention: the first true range needs a previous
//! close, so the seed is the mean of TR[1..=n] and the first valid bar is
//! bar `n`. Subsequent values use Wilder smoothing.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_ATR_PERIOD: usize = 14;

pub fn calc_atr(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values: to_points(bars, &atr_values(bars, period)),
    }
}

/// Normalized ATR: ATR / close * 100.
pub fn calc_natr(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let natr: Vec<Option<f64>> = atr_values(bars, period)
        .into_iter()
        .zip(bars)
        .map(|(atr, bar)| match atr {
            Some(a) if bar.close != 0.0 => Some(a / bar.close * 100.0),
            _ => None,
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Natr(period),
        values: to_points(bars, &natr),
    }
}

fn atr_values(bars: &[OhlcvBar], period: usize) -> Vec<Option<f64>> {
    let mut results = vec![None; bars.len()];
    if period == 0 || bars.len() <= period {
        return results;
    }

    let tr: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let mut atr = tr[1..=period].iter().sum::<f64>() / period as f64;
    results[period] = Some(atr);
    for i in (period + 1)..bars.len() {
        atr = (atr * (period - 1) as f64 + tr[i]) / period as f64;
        results[i] = Some(atr);
    }
    results
}

fn to_points(bars: &[OhlcvBar], values: &[Option<f64>]) -> Vec<IndicatorPoint> {
    bars.iter()
        .zip(values)
        .map(|(bar, v)| IndicatorPoint {
            timestamp: bar.timestamp,
            valid: v.is_some(),
            value: IndicatorValue::Simple(v.unwrap_or(0.0)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn make_bars(hlc: &[(f64, f64, f64)]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        hlc.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| OhlcvBar {
                symbol: "TEST".into(),
                timestamp: start + Duration::days(i as i64),
                open: close,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn atr_warmup() {
        let bars = make_bars(&[(110.0, 90.0, 100.0); 5]);
        let series = calc_atr(&bars, 3);

        assert_eq!(series.values.len(), 5);
        assert!(!series.values[2].valid);
        assert!(series.values[3].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn atr_seed_skips_first_bar() {
        let bars = make_bars(&[
            (200.0, 0.0, 100.0),
            (115.0, 105.0, 110.0),
            (120.0, 110.0, 115.0),
            (125.0, 115.0, 120.0),
        ]);
        let series = calc_atr(&bars, 2);
        // TR[1] = max(10, 15, 5) = 15, TR[2] = max(10, 10, 0) = 10
        let atr = series.simple_values();
        assert!((atr[2].unwrap() - 12.5).abs() < 1e-12);
        // Wilder: (12.5 * 1 + 10) / 2
        assert!((atr[3].unwrap() - 11.25).abs() < 1e-12);
    }

    #[test]
    fn atr_insufficient_bars() {
        let bars = make_bars(&[(110.0, 90.0, 100.0); 3]);
        assert!(calc_atr(&bars, 3).values.iter().all(|p| !p.valid));
    }

    #[test]
    fn natr_is_percent_of_close() {
        let bars = make_bars(&[(110.0, 90.0, 100.0); 4]);
        let natr = calc_natr(&bars, 2).simple_values();
        assert!((natr[2].unwrap() - 20.0).abs() < 1e-12);
        assert_eq!(calc_natr(&bars, 2).indicator_type, IndicatorType::Natr(2));
    }
}
