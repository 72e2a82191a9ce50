//! Feature quantization for histogram-based split search.

use crate::domain::stats::quantile_sorted;

pub const MAX_BINS: usize = 255;

/// Upper borders per feature. A value `x` falls in bin `j` when
/// `borders[j - 1] < x <= borders[j]`; splitting at border `k` sends bins
/// `0..=k` left.
#[derive(Debug, Clone)]
pub struct BinMapper {
    borders: Vec<Vec<f64>>,
}

impl BinMapper {
    pub fn fit(rows: &[Vec<f64>], num_features: usize, max_bins: usize) -> Self {
        let max_bins = max_bins.max(2);
        let borders = (0..num_features)
            .map(|f| {
                let mut values: Vec<f64> = rows
                    .iter()
                    .map(|r| r[f])
                    .filter(|v| !v.is_nan())
                    .collect();
                values.sort_by(f64::total_cmp);
                let mut distinct = values.clone();
                distinct.dedup();

                if distinct.len() <= max_bins {
                    distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
                } else {
                    let mut b: Vec<f64> = (1..max_bins)
                        .map(|k| quantile_sorted(&values, k as f64 / max_bins as f64))
                        .collect();
                    b.dedup();
                    // the top border must leave something on the right
                    if b.last().is_some_and(|&last| last >= distinct[distinct.len() - 1]) {
                        b.pop();
                    }
                    b
                }
            })
            .collect();
        Self { borders }
    }

    pub fn num_bins(&self, feature: usize) -> usize {
        self.borders[feature].len() + 1
    }

    pub fn border(&self, feature: usize, bin: usize) -> f64 {
        self.borders[feature][bin]
    }

    pub fn bin(&self, feature: usize, value: f64) -> usize {
        let x = if value.is_nan() { 0.0 } else { value };
        self.borders[feature].partition_point(|&b| b < x)
    }

    /// Row-major bin indices.
    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<u16>> {
        rows.iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .map(|(f, &v)| self.bin(f, v) as u16)
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn few_distinct_values_use_midpoints() {
        let rows = vec![vec![1.0], vec![3.0], vec![3.0], vec![5.0]];
        let mapper = BinMapper::fit(&rows, 1, MAX_BINS);
        assert_eq!(mapper.num_bins(0), 3);
        assert_eq!(mapper.border(0, 0), 2.0);
        assert_eq!(mapper.bin(0, 1.0), 0);
        assert_eq!(mapper.bin(0, 2.0), 0);
        assert_eq!(mapper.bin(0, 3.0), 1);
        assert_eq!(mapper.bin(0, 9.0), 2);
    }

    #[test]
    fn many_values_are_capped() {
        let rows: Vec<Vec<f64>> = (0..1000).map(|i| vec![i as f64]).collect();
        let mapper = BinMapper::fit(&rows, 1, 16);
        assert!(mapper.num_bins(0) <= 16);
        let binned = mapper.transform(&rows);
        assert_eq!(binned[0][0], 0);
        assert_eq!(binned[999][0] as usize, mapper.num_bins(0) - 1);
    }

    #[test]
    fn constant_feature_has_one_bin() {
        let rows = vec![vec![4.0]; 5];
        let mapper = BinMapper::fit(&rows, 1, MAX_BINS);
        assert_eq!(mapper.num_bins(0), 1);
        assert_eq!(mapper.bin(0, f64::NAN), 0);
    }
}
