//! Walk-forward cross-validation over panel rows keyed by date.
//!
//! Folds are produced most recent first. For fold `i`, with the unique dates
//! sorted newest to oldest:
//!
//! ```text
//! test_end    = i * test_len
//! test_start  = test_end + test_len
//! train_end   = test_start + lookahead - 1
//! train_start = train_end + train_len + lookahead - 1
//! ```
//!
//! Test rows satisfy `days[test_start] < d <= days[test_end]` and train rows
//! `days[train_start] < d <= days[train_end]`, which leaves `lookahead - 1`
//! unseen dates between the newest train date and the oldest test date.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

pub const TRADING_DAYS_PER_YEAR: usize = 252;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleTimeSeriesCv {
    pub n_splits: usize,
    pub train_period_length: usize,
    pub test_period_length: usize,
    pub lookahead: usize,
    pub shuffle: bool,
    pub seed: u64,
}

/// Number of test windows that cover one trading year.
pub fn n_splits_for_year(test_period_length: usize) -> usize {
    TRADING_DAYS_PER_YEAR / test_period_length.max(1)
}

impl MultipleTimeSeriesCv {
    pub fn new(
        n_splits: usize,
        train_period_length: usize,
        test_period_length: usize,
        lookahead: usize,
    ) -> Self {
        Self {
            n_splits,
            train_period_length,
            test_period_length,
            lookahead,
            shuffle: false,
            seed: 0,
        }
    }

    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    /// Split rows by their date keys. `dates[i]` is the date of row `i`;
    /// rows need not be sorted.
    pub fn split<T: Ord + Copy>(&self, dates: &[T]) -> Vec<CvSplit> {
        let days: Vec<T> = dates
            .iter()
            .copied()
            .collect::<BTreeSet<T>>()
            .into_iter()
            .rev()
            .collect();
        // a zero lookahead would let the train window reach into the test window
        let lookahead = self.lookahead.max(1);
        let test_len = self.test_period_length.max(1);

        let mut splits = Vec::with_capacity(self.n_splits);
        for i in 0..self.n_splits {
            let test_end = i * test_len;
            let test_start = test_end + test_len;
            if test_start >= days.len() {
                debug!(fold = i, days = days.len(), "history exhausted, stopping");
                break;
            }
            let train_end = test_start + lookahead - 1;
            let train_start = train_end + self.train_period_length + lookahead - 1;

            let (test_lo, test_hi) = (days[test_start], days[test_end]);
            let train_hi = days.get(train_end).copied();
            let train_lo = days.get(train_start).copied();

            let mut train_indices = Vec::new();
            let mut test_indices = Vec::new();
            for (row, &d) in dates.iter().enumerate() {
                if d > test_lo && d <= test_hi {
                    test_indices.push(row);
                } else if let Some(hi) = train_hi {
                    if d <= hi && train_lo.is_none_or(|lo| d > lo) {
                        train_indices.push(row);
                    }
                }
            }

            if train_indices.is_empty() || test_indices.is_empty() {
                debug!(fold = i, "empty train or test window, skipping");
                continue;
            }
            if self.shuffle {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                train_indices.shuffle(&mut rng);
            }
            splits.push(CvSplit {
                train_indices,
                test_indices,
            });
        }
        splits
    }
}
