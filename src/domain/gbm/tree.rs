//! Regression trees and their growth strategies.

use serde::{Deserialize, Serialize};

use super::binning::BinMapper;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousSplit {
    pub feature: usize,
    pub threshold: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Tree {
    /// Binary tree; node 0 is the root.
    Nodes { nodes: Vec<Node> },
    /// One split per level; leaf index bit `d` is set when level `d` goes right.
    Oblivious {
        splits: Vec<ObliviousSplit>,
        leaf_values: Vec<f64>,
    },
}

/// Missing values compare as zero.
fn goes_left(value: f64, threshold: f64) -> bool {
    let x = if value.is_nan() { 0.0 } else { value };
    x <= threshold
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Tree::Nodes { nodes } => {
                let mut idx = 0;
                loop {
                    match &nodes[idx] {
                        Node::Leaf { value } => return *value,
                        Node::Split {
                            feature,
                            threshold,
                            left,
                            right,
                            ..
                        } => {
                            idx = if goes_left(row[*feature], *threshold) {
                                *left
                            } else {
                                *right
                            };
                        }
                    }
                }
            }
            Tree::Oblivious {
                splits,
                leaf_values,
            } => {
                let leaf = splits
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !goes_left(row[s.feature], s.threshold))
                    .fold(0usize, |acc, (d, _)| acc | (1 << d));
                leaf_values[leaf]
            }
        }
    }

    /// Add this tree's split gains into `acc` (indexed by feature).
    pub fn accumulate_gain(&self, acc: &mut [f64]) {
        match self {
            Tree::Nodes { nodes } => {
                for node in nodes {
                    if let Node::Split { feature, gain, .. } = node {
                        acc[*feature] += gain;
                    }
                }
            }
            Tree::Oblivious { splits, .. } => {
                for s in splits {
                    acc[s.feature] += s.gain;
                }
            }
        }
    }

    pub fn num_leaves(&self) -> usize {
        match self {
            Tree::Nodes { nodes } => nodes
                .iter()
                .filter(|n| matches!(n, Node::Leaf { .. }))
                .count(),
            Tree::Oblivious { leaf_values, .. } => leaf_values.len(),
        }
    }
}

/// Inputs shared by every tree of one boosting run.
pub(crate) struct GrowContext<'a> {
    pub bins: &'a [Vec<u16>],
    pub mapper: &'a BinMapper,
    pub features: &'a [usize],
    pub min_data_in_leaf: usize,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy)]
struct SplitChoice {
    feature: usize,
    bin: usize,
    gain: f64,
}

#[derive(Default, Clone, Copy)]
struct Bucket {
    sum: f64,
    count: usize,
}

fn histogram(ctx: &GrowContext<'_>, rows: &[usize], residuals: &[f64], feature: usize) -> Vec<Bucket> {
    let mut hist = vec![Bucket::default(); ctx.mapper.num_bins(feature)];
    for &r in rows {
        let b = &mut hist[ctx.bins[r][feature] as usize];
        b.sum += residuals[r];
        b.count += 1;
    }
    hist
}

fn split_gain(left: Bucket, total: Bucket) -> f64 {
    let right = Bucket {
        sum: total.sum - left.sum,
        count: total.count - left.count,
    };
    left.sum * left.sum / left.count as f64 + right.sum * right.sum / right.count as f64
        - total.sum * total.sum / total.count as f64
}

fn best_split(ctx: &GrowContext<'_>, rows: &[usize], residuals: &[f64]) -> Option<SplitChoice> {
    let min_leaf = ctx.min_data_in_leaf.max(1);
    if rows.len() < 2 * min_leaf {
        return None;
    }
    let mut best: Option<SplitChoice> = None;
    for &feature in ctx.features {
        let hist = histogram(ctx, rows, residuals, feature);
        let total = hist.iter().fold(Bucket::default(), |acc, b| Bucket {
            sum: acc.sum + b.sum,
            count: acc.count + b.count,
        });
        let mut left = Bucket::default();
        for (bin, b) in hist.iter().enumerate().take(hist.len().saturating_sub(1)) {
            left.sum += b.sum;
            left.count += b.count;
            if left.count < min_leaf {
                continue;
            }
            if total.count - left.count < min_leaf {
                break;
            }
            let gain = split_gain(left, total);
            if gain > best.map_or(1e-12, |s| s.gain) {
                best = Some(SplitChoice { feature, bin, gain });
            }
        }
    }
    best
}

fn leaf_value(rows: &[usize], residuals: &[f64], learning_rate: f64) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let mean = rows.iter().map(|&r| residuals[r]).sum::<f64>() / rows.len() as f64;
    mean * learning_rate
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    best: Option<SplitChoice>,
}

/// Best-first growth: always split the leaf with the largest gain until
/// `num_leaves` is reached. `max_depth == 0` means unlimited depth.
pub(crate) fn grow_leaf_wise(
    ctx: &GrowContext<'_>,
    residuals: &[f64],
    num_leaves: usize,
    max_depth: usize,
) -> Tree {
    let all: Vec<usize> = (0..ctx.bins.len()).collect();
    let mut nodes = vec![Node::Leaf {
        value: leaf_value(&all, residuals, ctx.learning_rate),
    }];
    let can_split = |depth: usize| max_depth == 0 || depth < max_depth;

    let root_best = if can_split(0) {
        best_split(ctx, &all, residuals)
    } else {
        None
    };
    let mut open = vec![OpenLeaf {
        node: 0,
        rows: all,
        depth: 0,
        best: root_best,
    }];
    let mut leaves = 1;

    while leaves < num_leaves {
        let pick = open
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.best.map(|b| (i, b.gain)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);
        let Some(i) = pick else { break };
        let leaf = open.swap_remove(i);
        let Some(choice) = leaf.best else { break };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
            .rows
            .iter()
            .partition(|&&r| ctx.bins[r][choice.feature] as usize <= choice.bin);

        let left = nodes.len();
        let right = left + 1;
        nodes.push(Node::Leaf {
            value: leaf_value(&left_rows, residuals, ctx.learning_rate),
        });
        nodes.push(Node::Leaf {
            value: leaf_value(&right_rows, residuals, ctx.learning_rate),
        });
        nodes[leaf.node] = Node::Split {
            feature: choice.feature,
            threshold: ctx.mapper.border(choice.feature, choice.bin),
            gain: choice.gain,
            left,
            right,
        };
        leaves += 1;

        let depth = leaf.depth + 1;
        for (node, rows) in [(left, left_rows), (right, right_rows)] {
            let best = if can_split(depth) {
                best_split(ctx, &rows, residuals)
            } else {
                None
            };
            open.push(OpenLeaf {
                node,
                rows,
                depth,
                best,
            });
        }
    }

    Tree::Nodes { nodes }
}

struct Group {
    rows: Vec<usize>,
    fallback: f64,
}

/// Level-wise growth of an oblivious tree: every level applies the same
/// split to all of its leaves. A leaf holding fewer than `min_data_in_leaf`
/// rows takes the value of its nearest ancestor that did not.
pub(crate) fn grow_symmetric(ctx: &GrowContext<'_>, residuals: &[f64], depth: usize) -> Tree {
    let all: Vec<usize> = (0..ctx.bins.len()).collect();
    let min_leaf = ctx.min_data_in_leaf.max(1);
    let root_value = leaf_value(&all, residuals, ctx.learning_rate);
    let mut groups = vec![Group {
        rows: all,
        fallback: root_value,
    }];
    let mut splits = Vec::new();

    for level in 0..depth {
        let Some(choice) = best_level_split(ctx, &groups, residuals) else {
            break;
        };

        let mut next: Vec<Group> = (0..groups.len() * 2)
            .map(|_| Group {
                rows: Vec::new(),
                fallback: 0.0,
            })
            .collect();
        for (g, group) in groups.iter().enumerate() {
            let fallback = if group.rows.len() >= min_leaf {
                leaf_value(&group.rows, residuals, ctx.learning_rate)
            } else {
                group.fallback
            };
            next[g].fallback = fallback;
            next[g | (1 << level)].fallback = fallback;
            for &r in &group.rows {
                let side = if ctx.bins[r][choice.feature] as usize <= choice.bin {
                    g
                } else {
                    g | (1 << level)
                };
                next[side].rows.push(r);
            }
        }
        splits.push(ObliviousSplit {
            feature: choice.feature,
            threshold: ctx.mapper.border(choice.feature, choice.bin),
            gain: choice.gain,
        });
        groups = next;
    }

    let leaf_values = groups
        .iter()
        .map(|g| {
            if g.rows.len() >= min_leaf {
                leaf_value(&g.rows, residuals, ctx.learning_rate)
            } else {
                g.fallback
            }
        })
        .collect();
    Tree::Oblivious {
        splits,
        leaf_values,
    }
}

fn best_level_split(
    ctx: &GrowContext<'_>,
    groups: &[Group],
    residuals: &[f64],
) -> Option<SplitChoice> {
    let min_leaf = ctx.min_data_in_leaf.max(1);
    let mut best: Option<SplitChoice> = None;
    for &feature in ctx.features {
        let n_bins = ctx.mapper.num_bins(feature);
        let hists: Vec<(Vec<Bucket>, Bucket)> = groups
            .iter()
            .filter(|g| !g.rows.is_empty())
            .map(|g| {
                let h = histogram(ctx, &g.rows, residuals, feature);
                let total = Bucket {
                    sum: h.iter().map(|b| b.sum).sum(),
                    count: g.rows.len(),
                };
                (h, total)
            })
            .collect();
        let mut lefts = vec![Bucket::default(); hists.len()];

        for bin in 0..n_bins.saturating_sub(1) {
            let mut gain = 0.0;
            let mut n_left = 0;
            let mut n_right = 0;
            for ((h, total), left) in hists.iter().zip(lefts.iter_mut()) {
                left.sum += h[bin].sum;
                left.count += h[bin].count;
                n_left += left.count;
                n_right += total.count - left.count;
                // splits that would starve a leaf add no gain there
                if left.count >= min_leaf && total.count - left.count >= min_leaf {
                    gain += split_gain(*left, *total);
                }
            }
            if n_left == 0 || n_right == 0 {
                continue;
            }
            if gain > best.map_or(1e-12, |s| s.gain) {
                best = Some(SplitChoice { feature, bin, gain });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let residuals = rows
            .iter()
            .map(|r| if r[0] < 20.0 { -1.0 } else { 1.0 })
            .collect();
        (rows, residuals)
    }

    #[test]
    fn leaf_wise_finds_the_step() {
        let (rows, residuals) = step_data();
        let mapper = BinMapper::fit(&rows, 2, 255);
        let bins = mapper.transform(&rows);
        let ctx = GrowContext {
            bins: &bins,
            mapper: &mapper,
            features: &[0, 1],
            min_data_in_leaf: 5,
            learning_rate: 1.0,
        };
        let tree = grow_leaf_wise(&ctx, &residuals, 2, 0);

        assert_eq!(tree.num_leaves(), 2);
        let Tree::Nodes { nodes } = &tree else {
            panic!("expected node tree")
        };
        match &nodes[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 0);
                assert_abs_diff_eq!(*threshold, 19.5);
            }
            other => panic!("root should split, got {:?}", other),
        }
        assert_abs_diff_eq!(tree.predict(&[3.0, 0.0]), -1.0);
        assert_abs_diff_eq!(tree.predict(&[30.0, 0.0]), 1.0);
    }

    #[test]
    fn min_data_blocks_splits() {
        let (rows, residuals) = step_data();
        let mapper = BinMapper::fit(&rows, 2, 255);
        let bins = mapper.transform(&rows);
        let ctx = GrowContext {
            bins: &bins,
            mapper: &mapper,
            features: &[0, 1],
            min_data_in_leaf: 30,
            learning_rate: 0.1,
        };
        let tree = grow_leaf_wise(&ctx, &residuals, 8, 0);
        assert_eq!(tree.num_leaves(), 1);
        assert_abs_diff_eq!(tree.predict(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn symmetric_tree_uses_one_split_per_level() {
        let (rows, residuals) = step_data();
        let mapper = BinMapper::fit(&rows, 2, 255);
        let bins = mapper.transform(&rows);
        let ctx = GrowContext {
            bins: &bins,
            mapper: &mapper,
            features: &[0, 1],
            min_data_in_leaf: 1,
            learning_rate: 1.0,
        };
        let tree = grow_symmetric(&ctx, &residuals, 2);
        let Tree::Oblivious {
            splits,
            leaf_values,
        } = &tree
        else {
            panic!("expected oblivious tree")
        };
        assert!(!splits.is_empty());
        assert_eq!(leaf_values.len(), 1 << splits.len());
        assert_eq!(splits[0].feature, 0);
        assert_abs_diff_eq!(tree.predict(&[3.0, 0.0]), -1.0);
        assert_abs_diff_eq!(tree.predict(&[30.0, 2.0]), 1.0);
    }

    #[test]
    fn gain_accumulates_per_feature() {
        let tree = Tree::Oblivious {
            splits: vec![
                ObliviousSplit {
                    feature: 1,
                    threshold: 0.0,
                    gain: 2.0,
                },
                ObliviousSplit {
                    feature: 1,
                    threshold: 1.0,
                    gain: 0.5,
                },
            ],
            leaf_values: vec![0.0; 4],
        };
        let mut acc = vec![0.0; 3];
        tree.accumulate_gain(&mut acc);
        assert_eq!(acc, vec![0.0, 2.5, 0.0]);
    }

    #[test]
    fn missing_values_route_as_zero() {
        let tree = Tree::Nodes {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    gain: 1.0,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: -1.0 },
                Node::Leaf { value: 1.0 },
            ],
        };
        assert_eq!(tree.predict(&[f64::NAN]), -1.0);
        assert_eq!(tree.predict(&[0.7]), 1.0);
    }
}
