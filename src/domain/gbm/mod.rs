//! Gradient-boosted regression trees.
//!
//! Squared-error boosting over histogram-binned features with two growth
//! policies: LightGBM-style best-first trees bounded by `num_leaves`, and
//! CatBoost-style symmetric (oblivious) trees of fixed depth.

pub mod binning;
pub mod tree;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::dataset::Dataset;
use crate::domain::error::AlphalabError;

use binning::{BinMapper, MAX_BINS};
use tree::{grow_leaf_wise, grow_symmetric, GrowContext, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeGrowth {
    LeafWise,
    Symmetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    pub learning_rate: f64,
    /// Leaf budget for leaf-wise trees.
    pub num_leaves: usize,
    /// Depth of symmetric trees; optional depth cap (0 = none) for leaf-wise.
    pub max_depth: usize,
    /// Share of features sampled for each tree.
    pub feature_fraction: f64,
    pub min_data_in_leaf: usize,
    pub num_boost_round: usize,
    pub growth: TreeGrowth,
    pub seed: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: 0,
            feature_fraction: 1.0,
            min_data_in_leaf: 20,
            num_boost_round: 100,
            growth: TreeGrowth::LeafWise,
            seed: 42,
        }
    }
}

impl GbmParams {
    pub fn validate(&self) -> Result<(), AlphalabError> {
        if self.num_boost_round == 0 {
            return Err(AlphalabError::model("num_boost_round must be positive"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(AlphalabError::model("learning_rate must be positive"));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(AlphalabError::model("feature_fraction must be in (0, 1]"));
        }
        if self.growth == TreeGrowth::Symmetric && self.max_depth == 0 {
            return Err(AlphalabError::model("symmetric trees need max_depth > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    pub params: GbmParams,
    feature_names: Vec<String>,
    init_score: f64,
    trees: Vec<Tree>,
}

impl Booster {
    /// Fit `params.num_boost_round` trees to `data`.
    pub fn train(data: &Dataset, params: &GbmParams) -> Result<Self, AlphalabError> {
        params.validate()?;
        if data.is_empty() {
            return Err(AlphalabError::model("cannot train on empty data"));
        }
        if data.targets.len() != data.len() {
            return Err(AlphalabError::model("targets do not match rows"));
        }
        let num_features = data.num_features();
        if num_features == 0 || data.rows.iter().any(|r| r.len() != num_features) {
            return Err(AlphalabError::model("rows do not match feature names"));
        }

        let mapper = BinMapper::fit(&data.rows, num_features, MAX_BINS);
        let bins = mapper.transform(&data.rows);
        let init_score = data.targets.iter().sum::<f64>() / data.len() as f64;
        let mut scores = vec![init_score; data.len()];
        let mut residuals = vec![0.0; data.len()];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let n_sampled = ((params.feature_fraction * num_features as f64).round() as usize)
            .clamp(1, num_features);

        let mut trees = Vec::with_capacity(params.num_boost_round);
        for _ in 0..params.num_boost_round {
            for ((res, y), s) in residuals.iter_mut().zip(&data.targets).zip(&scores) {
                *res = y - s;
            }
            let mut features = if n_sampled < num_features {
                index::sample(&mut rng, num_features, n_sampled).into_vec()
            } else {
                (0..num_features).collect()
            };
            features.sort_unstable();

            let ctx = GrowContext {
                bins: &bins,
                mapper: &mapper,
                features: &features,
                min_data_in_leaf: params.min_data_in_leaf,
                learning_rate: params.learning_rate,
            };
            let tree = match params.growth {
                TreeGrowth::LeafWise => {
                    grow_leaf_wise(&ctx, &residuals, params.num_leaves, params.max_depth)
                }
                TreeGrowth::Symmetric => grow_symmetric(&ctx, &residuals, params.max_depth),
            };
            for (s, row) in scores.iter_mut().zip(&data.rows) {
                *s += tree.predict(row);
            }
            trees.push(tree);
        }

        debug!(
            rows = data.len(),
            features = num_features,
            rounds = trees.len(),
            "trained booster"
        );
        Ok(Self {
            params: params.clone(),
            feature_names: data.feature_names.clone(),
            init_score,
            trees,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Predict using the first `num_iteration` trees (all when `None`).
    pub fn predict(&self, row: &[f64], num_iteration: Option<usize>) -> f64 {
        let n = num_iteration.map_or(self.trees.len(), |n| n.min(self.trees.len()));
        self.init_score + self.trees[..n].iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict_many(&self, rows: &[Vec<f64>], num_iteration: Option<usize>) -> Vec<f64> {
        rows.iter().map(|r| self.predict(r, num_iteration)).collect()
    }

    /// Predictions after each of `iterations`, in one pass over the trees.
    /// Result is indexed `[iteration][row]`.
    pub fn predict_staged(&self, rows: &[Vec<f64>], iterations: &[usize]) -> Vec<Vec<f64>> {
        let mut out = vec![Vec::with_capacity(rows.len()); iterations.len()];
        for row in rows {
            let mut acc = self.init_score;
            let mut done = 0;
            let mut staged: Vec<(usize, usize)> = iterations
                .iter()
                .enumerate()
                .map(|(i, &n)| (n.min(self.trees.len()), i))
                .collect();
            staged.sort_unstable();
            for (n, slot) in staged {
                for tree in &self.trees[done..n] {
                    acc += tree.predict(row);
                }
                done = n;
                out[slot].push(acc);
            }
        }
        out
    }

    /// Total split gain per feature.
    pub fn feature_importance_gain(&self) -> Vec<f64> {
        let mut acc = vec![0.0; self.feature_names.len()];
        for tree in &self.trees {
            tree.accumulate_gain(&mut acc);
        }
        acc
    }

    /// Gain importance scaled to sum to one (all zeros when no tree split).
    pub fn feature_importance(&self) -> Vec<f64> {
        let gain = self.feature_importance_gain();
        let total: f64 = gain.iter().sum();
        if total > 0.0 {
            gain.iter().map(|g| g / total).collect()
        } else {
            gain
        }
    }

    pub fn to_json(&self) -> Result<String, AlphalabError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AlphalabError::model(format!("failed to serialize booster: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self, AlphalabError> {
        serde_json::from_str(text)
            .map_err(|e| AlphalabError::model(format!("failed to parse booster: {}", e)))
    }
}
