//! Bollinger Bands: an SMA of closes with bands `mult` population standard
//! deviations above and below. The first `period - 1` points are invalid.
//!
//! [`band_distances`] turns the bands into the two scale-free features the
//! model uses.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_bollinger(
    bars: &[OhlcvBar],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let mult = stddev_mult_x100 as f64 / 100.0;
    let warmup = if period == 0 {
        bars.len()
    } else {
        (period - 1).min(bars.len())
    };

    let invalid = bars[..warmup].iter().map(|bar| IndicatorPoint {
        timestamp: bar.timestamp,
        valid: false,
        value: IndicatorValue::Bollinger {
            upper: 0.0,
            middle: 0.0,
            lower: 0.0,
        },
    });
    let bands = (period > 0)
        .then(|| bars.windows(period))
        .into_iter()
        .flatten()
        .map(|window| {
            let closes = window.iter().map(|b| b.close);
            let middle = closes.clone().sum::<f64>() / period as f64;
            let variance = closes.map(|c| (c - middle).powi(2)).sum::<f64>() / period as f64;
            let width = mult * variance.sqrt();
            IndicatorPoint {
                timestamp: window[period - 1].timestamp,
                valid: true,
                value: IndicatorValue::Bollinger {
                    upper: middle + width,
                    middle,
                    lower: middle - width,
                },
            }
        });
    let values: Vec<IndicatorPoint> = invalid.chain(bands).collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        values,
    }
}

/// Per bar, `(ln(1 + (upper - close) / upper), ln(1 + (close - lower) / close))`.
///
/// Both are `None` during warmup or where the ratio is not finite.
pub fn band_distances(
    bars: &[OhlcvBar],
    period: usize,
    stddev_mult_x100: u32,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    calculate_bollinger(bars, period, stddev_mult_x100)
        .values
        .iter()
        .zip(bars)
        .map(|(point, bar)| match (point.valid, &point.value) {
            (true, IndicatorValue::Bollinger { upper, lower, .. }) => {
                let close = bar.close;
                (
                    finite(((upper - close) / upper).ln_1p()),
                    finite(((close - lower) / close).ln_1p()),
                )
            }
            _ => (None, None),
        })
        .unzip()
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}
