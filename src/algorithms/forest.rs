use super::{check_training_input, ClassWeights, Classifier};
use crate::error::{CartRankError, Result};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const IMPURITY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART classification tree split on weighted Gini impurity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct GrowParams {
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(positive: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = positive / total;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

impl DecisionTree {
    fn grow(
        x: &DMatrix<f64>,
        y: &[u8],
        sample_weights: &[f64],
        indices: Vec<usize>,
        params: &GrowParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self::default();
        tree.nodes.push(Node::Leaf { probability: 0.0 });

        // Explicit work stack keeps deep trees off the call stack.
        let mut pending = vec![(0usize, indices, 0usize)];
        while let Some((slot, indices, depth)) = pending.pop() {
            let (positive, total) = indices.iter().fold((0.0, 0.0), |(pos, tot), &i| {
                let w = sample_weights[i];
                (pos + if y[i] == 1 { w } else { 0.0 }, tot + w)
            });
            let probability = if total > 0.0 { positive / total } else { 0.0 };
            let impurity = gini(positive, total);

            let depth_exhausted = params.max_depth.map_or(false, |max| depth >= max);
            if impurity <= IMPURITY_EPSILON || depth_exhausted || indices.len() < params.min_samples_split {
                tree.nodes[slot] = Node::Leaf { probability };
                continue;
            }

            let split = match Self::best_split(x, y, sample_weights, &indices, total, params.max_features, rng) {
                Some(split) if split.impurity < impurity * total - IMPURITY_EPSILON => split,
                _ => {
                    tree.nodes[slot] = Node::Leaf { probability };
                    continue;
                }
            };

            let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| x[(i, split.feature)] <= split.threshold);

            let left = tree.nodes.len();
            tree.nodes.push(Node::Leaf { probability });
            let right = tree.nodes.len();
            tree.nodes.push(Node::Leaf { probability });
            tree.nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            pending.push((right, right_indices, depth + 1));
            pending.push((left, left_indices, depth + 1));
        }

        tree
    }

    /// Scans a random subset of features; keeps drawing past `max_features`
    /// until at least one valid partition is found.
    fn best_split(
        x: &DMatrix<f64>,
        y: &[u8],
        sample_weights: &[f64],
        indices: &[usize],
        total: f64,
        max_features: usize,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..x.ncols()).collect();
        features.shuffle(rng);

        let total_positive: f64 = indices
            .iter()
            .filter(|&&i| y[i] == 1)
            .map(|&i| sample_weights[i])
            .sum();

        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for (visited, &feature) in features.iter().enumerate() {
            if visited >= max_features && best.is_some() {
                break;
            }

            sorted.sort_by(|&a, &b| x[(a, feature)].partial_cmp(&x[(b, feature)]).unwrap_or(Ordering::Equal));

            let mut left_positive = 0.0;
            let mut left_total = 0.0;
            for window in 0..sorted.len().saturating_sub(1) {
                let i = sorted[window];
                let w = sample_weights[i];
                left_total += w;
                if y[i] == 1 {
                    left_positive += w;
                }

                let current = x[(i, feature)];
                let next = x[(sorted[window + 1], feature)];
                if next <= current {
                    continue;
                }

                let right_total = total - left_total;
                let right_positive = total_positive - left_positive;
                let impurity = left_total * gini(left_positive, left_total)
                    + right_total * gini(right_positive, right_total);

                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best
    }

    /// Walks from the root to a leaf. A malformed tree (bad index or a
    /// cycle) yields `None` instead of panicking.
    fn leaf_probability(&self, features: &[f64]) -> Option<f64> {
        let mut slot = 0;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(slot)? {
                Node::Leaf { probability } => return Some(*probability),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    slot = if *features.get(*feature)? <= *threshold { *left } else { *right };
                }
            }
        }
        None
    }

    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        self.leaf_probability(features).unwrap_or(0.0)
    }

    /// Structural checks for a tree that came from outside this process.
    /// Children always sit after their parent, which also rules out cycles.
    pub fn validate(&self, width: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(CartRankError::Data("decision tree has no nodes".into()));
        }
        for (slot, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { probability } => {
                    if !(0.0..=1.0).contains(&probability) {
                        return Err(CartRankError::Data(format!(
                            "leaf {} has probability {} outside [0, 1]",
                            slot, probability
                        )));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= width {
                        return Err(CartRankError::Data(format!(
                            "node {} splits on feature {} but the schema has {} columns",
                            slot, feature, width
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(CartRankError::Data(format!("node {} has a non-finite threshold", slot)));
                    }
                    for child in [left, right] {
                        if child <= slot || child >= self.nodes.len() {
                            return Err(CartRankError::Data(format!(
                                "node {} points to invalid child {} ({} nodes)",
                                slot,
                                child,
                                self.nodes.len()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Bagged ensemble of decision trees; the class-1 probability is the mean of
/// the per-tree leaf probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    seed: u64,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(n_estimators: usize, max_depth: Option<usize>, min_samples_split: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            max_depth,
            min_samples_split: min_samples_split.max(2),
            seed,
            trees: Vec::new(),
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn validate(&self, width: usize) -> Result<()> {
        if self.trees.is_empty() {
            return Err(CartRankError::Data("random forest has no trees".into()));
        }
        self.trees.iter().try_for_each(|tree| tree.validate(width))
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: &DMatrix<f64>, y: &[u8], weights: &ClassWeights) -> Result<()> {
        check_training_input(self.name(), x, y)?;

        let n = x.nrows();
        let params = GrowParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: ((x.ncols() as f64).sqrt() as usize).max(1),
        };
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());

                // Bootstrap sample, folded into per-row multiplicities.
                let mut counts = vec![0u32; n];
                for _ in 0..n {
                    counts[tree_rng.gen_range(0..n)] += 1;
                }
                let sample_weights: Vec<f64> = counts
                    .iter()
                    .zip(y)
                    .map(|(&count, &label)| count as f64 * weights.for_label(label))
                    .collect();
                let indices: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

                DecisionTree::grow(x, y, &sample_weights, indices, &params, &mut tree_rng)
            })
            .collect();

        Ok(())
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict_proba(features)).sum();
        sum / self.trees.len() as f64
    }
}
