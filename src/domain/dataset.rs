//! Dense row-major training data.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub timestamps: Vec<NaiveDateTime>,
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.timestamps.iter().map(|t| t.date()).collect()
    }

    /// Distinct calendar dates, ascending.
    pub fn unique_dates(&self) -> Vec<NaiveDate> {
        let set: BTreeSet<NaiveDate> = self.timestamps.iter().map(|t| t.date()).collect();
        set.into_iter().collect()
    }

    /// One-hot encode `categoricals`. Dummy columns are appended after the
    /// remaining features as `<name>_<value>`, levels in ascending order.
    pub fn with_dummies(&self, categoricals: &[&str], drop_first: bool) -> Dataset {
        let (keep, encode) = self.partition_columns(categoricals);

        let mut feature_names: Vec<String> =
            keep.iter().map(|&i| self.feature_names[i].clone()).collect();
        let mut levels_per_col = Vec::with_capacity(encode.len());
        for &col in &encode {
            let mut levels = self.levels(col);
            if drop_first && !levels.is_empty() {
                levels.remove(0);
            }
            for level in &levels {
                feature_names.push(format!("{}_{}", self.feature_names[col], level));
            }
            levels_per_col.push((col, levels));
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out: Vec<f64> = keep.iter().map(|&i| row[i]).collect();
                for (col, levels) in &levels_per_col {
                    out.extend(levels.iter().map(|&l| if row[*col] == l { 1.0 } else { 0.0 }));
                }
                out
            })
            .collect();

        Dataset {
            timestamps: self.timestamps.clone(),
            feature_names,
            rows,
            targets: self.targets.clone(),
        }
    }

    /// Replace each categorical value by the index of its level in sorted order.
    pub fn factorize(&self, categoricals: &[&str]) -> Dataset {
        let mut out = self.clone();
        for name in categoricals {
            let Some(col) = self.column_index(name) else { continue };
            let levels = self.levels(col);
            for row in &mut out.rows {
                if let Some(code) = levels.iter().position(|&l| l == row[col]) {
                    row[col] = code as f64;
                }
            }
        }
        out
    }

    fn partition_columns(&self, categoricals: &[&str]) -> (Vec<usize>, Vec<usize>) {
        let encode: Vec<usize> = categoricals
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        let keep = (0..self.num_features()).filter(|i| !encode.contains(i)).collect();
        (keep, encode)
    }

    fn levels(&self, col: usize) -> Vec<f64> {
        let mut levels: Vec<f64> = self.rows.iter().map(|r| r[col]).collect();
        levels.sort_by(f64::total_cmp);
        levels.dedup();
        levels
    }
}
