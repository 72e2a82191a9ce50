//! Numeric helpers shared by feature engineering, IC and factor analysis.
//!
//! Missing observations are modelled as `Option<f64>`; functions that take
//! plain slices assume every value is present.

use std::cmp::Ordering;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_copy(values);
    Some(quantile_sorted(&sorted, 0.5))
}

/// Standard deviation with `ddof` delta degrees of freedom (1 = sample).
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - ddof) as f64).sqrt())
}

/// Standardize present values by their mean and `ddof` standard deviation.
pub fn zscore(values: &[Option<f64>], ddof: usize) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let (Some(m), Some(sd)) = (mean(&present), std_dev(&present, ddof)) else {
        return vec![None; values.len()];
    };
    if sd == 0.0 {
        return vec![None; values.len()];
    }
    values.iter().map(|v| v.map(|x| (x - m) / sd)).collect()
}

/// 1-based ranks with ties sharing their average rank.
pub fn rank_average(values: &[f64], descending: bool) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let ord = values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal);
        if descending { ord.reverse() } else { ord }
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Average ranks over the present values; missing inputs stay missing.
pub fn rank_options(values: &[Option<f64>], descending: bool) -> Vec<Option<f64>> {
    let present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    let raw: Vec<f64> = present.iter().map(|&(_, x)| x).collect();
    let ranks = rank_average(&raw, descending);

    let mut out = vec![None; values.len()];
    for ((idx, _), r) in present.into_iter().zip(ranks) {
        out[idx] = Some(r);
    }
    out
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx * vy).sqrt())
}

/// Spearman rank correlation: Pearson correlation of average ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    pearson(&rank_average(x, false), &rank_average(y, false))
}

/// Linear-interpolated quantile of an ascending slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Equal-frequency binning into `q` buckets, labelled from 0.
///
/// Duplicate bin edges are dropped, so heavily tied data can produce fewer
/// than `q` buckets. The lowest edge is inclusive.
pub fn qcut(values: &[Option<f64>], q: usize) -> Vec<Option<usize>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if q == 0 || present.is_empty() {
        return vec![None; values.len()];
    }
    let sorted = sorted_copy(&present);
    let mut edges: Vec<f64> = (0..=q)
        .map(|k| quantile_sorted(&sorted, k as f64 / q as f64))
        .collect();
    edges.dedup();
    if edges.len() < 2 {
        return vec![None; values.len()];
    }

    values
        .iter()
        .map(|v| {
            let x = (*v)?;
            if x < edges[0] || x > edges[edges.len() - 1] {
                return None;
            }
            let bin = edges[1..].iter().position(|&e| x <= e)?;
            Some(bin)
        })
        .collect()
}

/// Trailing mean over `window` values, emitted once `min_periods` are present.
pub fn rolling_mean(values: &[Option<f64>], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f64> = values[start..=i].iter().flatten().copied().collect();
            if present.len() >= min_periods.max(1) {
                mean(&present)
            } else {
                None
            }
        })
        .collect()
}

/// x[i] / x[i - periods] - 1.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if periods == 0 || i < periods {
                return None;
            }
            let prev = values[i - periods];
            if prev == 0.0 {
                None
            } else {
                Some(values[i] / prev - 1.0)
            }
        })
        .collect()
}

/// Move each value `periods` rows earlier; the tail becomes missing.
pub fn shift_back(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| values.get(i + periods).copied().flatten())
        .collect()
}

/// Standard normal CDF (Abramowitz-Stegun 7.1.26, |error| < 1.5e-7).
pub fn normal_cdf(x: f64) -> f64 {
    let z = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * z);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-z * z).exp();
    if x >= 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mean_median_std() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(mean(&v).unwrap(), 2.5);
        assert_abs_diff_eq!(median(&v).unwrap(), 2.5);
        assert_abs_diff_eq!(std_dev(&v, 0).unwrap(), 1.25_f64.sqrt());
        assert_abs_diff_eq!(std_dev(&v, 1).unwrap(), (5.0_f64 / 3.0).sqrt());
        assert!(mean(&[]).is_none());
        assert!(std_dev(&[1.0], 1).is_none());
    }

    #[test]
    fn zscore_skips_missing() {
        let z = zscore(&[Some(1.0), None, Some(3.0)], 0);
        assert_abs_diff_eq!(z[0].unwrap(), -1.0);
        assert!(z[1].is_none());
        assert_abs_diff_eq!(z[2].unwrap(), 1.0);
    }

    #[test]
    fn zscore_constant_input_is_missing() {
        assert!(zscore(&[Some(2.0), Some(2.0)], 1).iter().all(Option::is_none));
    }

    #[test]
    fn rank_average_handles_ties() {
        assert_eq!(rank_average(&[10.0, 20.0, 20.0, 5.0], false), vec![2.0, 3.5, 3.5, 1.0]);
        assert_eq!(rank_average(&[10.0, 20.0, 20.0, 5.0], true), vec![3.0, 1.5, 1.5, 4.0]);
    }

    #[test]
    fn rank_options_preserves_missing() {
        let r = rank_options(&[Some(3.0), None, Some(1.0)], false);
        assert_eq!(r, vec![Some(2.0), None, Some(1.0)]);
    }

    #[test]
    fn spearman_monotone_is_one() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 4.0, 9.0, 16.0, 25.0];
        assert_abs_diff_eq!(spearman(&x, &y).unwrap(), 1.0, epsilon = 1e-12);
        let rev: Vec<f64> = y.iter().rev().copied().collect();
        assert_abs_diff_eq!(spearman(&x, &rev).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn spearman_undefined_cases() {
        assert!(spearman(&[1.0], &[2.0]).is_none());
        assert!(spearman(&[1.0, 2.0], &[3.0, 3.0]).is_none());
        assert!(spearman(&[1.0, 2.0], &[3.0]).is_none());
    }

    #[test]
    fn quantile_interpolates() {
        let s = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(quantile_sorted(&s, 0.0), 1.0);
        assert_abs_diff_eq!(quantile_sorted(&s, 0.5), 2.5);
        assert_abs_diff_eq!(quantile_sorted(&s, 1.0), 4.0);
    }

    #[test]
    fn qcut_equal_frequency() {
        let values: Vec<Option<f64>> = (1..=10).map(|i| Some(i as f64)).collect();
        let bins = qcut(&values, 5);
        assert_eq!(
            bins,
            vec![Some(0), Some(0), Some(1), Some(1), Some(2), Some(2), Some(3), Some(3), Some(4), Some(4)]
        );
    }

    #[test]
    fn qcut_drops_duplicate_edges() {
        let values: Vec<Option<f64>> = [0.0, 0.0, 0.0, 1.0, 2.0, 3.0].iter().map(|&v| Some(v)).collect();
        let bins = qcut(&values, 3);
        // edges 0.0, 0.0, 1.33, 3.0 collapse to two buckets
        assert_eq!(bins, vec![Some(0), Some(0), Some(0), Some(0), Some(1), Some(1)]);
    }

    #[test]
    fn qcut_missing_and_constant() {
        assert_eq!(qcut(&[None, Some(1.0)], 2), vec![None, None]);
        assert_eq!(qcut(&[], 10), Vec::<Option<usize>>::new());
    }

    #[test]
    fn rolling_mean_min_periods() {
        let v = [Some(1.0), Some(2.0), None, Some(4.0)];
        assert_eq!(
            rolling_mean(&v, 2, 1),
            vec![Some(1.0), Some(1.5), Some(2.0), Some(4.0)]
        );
        assert_eq!(rolling_mean(&v, 2, 2), vec![None, Some(1.5), None, None]);
    }

    #[test]
    fn pct_change_and_shift() {
        let r = pct_change(&[100.0, 110.0, 121.0], 1);
        assert!(r[0].is_none());
        assert_abs_diff_eq!(r[1].unwrap(), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(r[2].unwrap(), 0.1, epsilon = 1e-12);

        let shifted = shift_back(&r, 1);
        assert_eq!(shifted.len(), 3);
        assert_abs_diff_eq!(shifted[0].unwrap(), 0.1, epsilon = 1e-12);
        assert!(shifted[2].is_none());
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert_abs_diff_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(normal_cdf(1.96), 0.975, epsilon = 1e-4);
        assert_abs_diff_eq!(normal_cdf(-1.96), 0.025, epsilon = 1e-4);
    }
}
