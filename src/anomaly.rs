//! Unsupervised outlier scoring for the fraud engine.
//!
//! The fraud rules only see a score through [`OutlierScorer`], so the
//! isolation forest here can be swapped for a rolling-statistics or
//! offline-trained model without touching them.
//!
//! Known limitation: the forest is fitted per call on whatever history the
//! caller supplies. With one historical record the path-length normaliser
//! `c(1)` is zero, every tree is a single leaf and the score collapses to the
//! neutral `0.0`. Small histories in general give scores with little
//! statistical meaning; the fraud engine flags them as low-confidence.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub trait OutlierScorer: Send + Sync {
    /// Fits on `history` (one feature row per record) and scores `sample`.
    /// Scores are in `(-1, 1)`; negative means more anomalous. An empty
    /// history scores `0.0`.
    fn score(&self, history: &[Vec<f64>], sample: &[f64]) -> f64;
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_trees: usize,
    sample_size: usize,
    seed: u64,
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build_tree(rows: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let dims = rows[0].len();
    let spreads: Vec<(usize, f64, f64)> = (0..dims)
        .filter_map(|feature| {
            let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r[feature]), hi.max(r[feature]))
            });
            (max > min).then_some((feature, min, max))
        })
        .collect();

    if spreads.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, min, max) = spreads[rng.gen_range(0..spreads.len())];
    let threshold = Uniform::new(min, max).sample(rng);

    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
        rows.iter().copied().partition(|r| r[feature] < threshold);

    if left.is_empty() || right.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &Node, sample: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let value = sample.get(*feature).copied().unwrap_or(0.0);
            if value < *threshold {
                path_length(left, sample, depth + 1)
            } else {
                path_length(right, sample, depth + 1)
            }
        }
    }
}

impl IsolationForest {
    pub fn new(n_trees: usize, sample_size: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            sample_size: sample_size.max(2),
            seed,
        }
    }

    fn fit(&self, history: &[Vec<f64>], rng: &mut StdRng) -> (Vec<Node>, usize) {
        let psi = self.sample_size.min(history.len());
        let max_depth = (psi.max(2) as f64).log2().ceil() as usize;

        let trees = (0..self.n_trees)
            .map(|_| {
                let rows: Vec<&[f64]> = sample(rng, history.len(), psi)
                    .into_iter()
                    .map(|i| history[i].as_slice())
                    .collect();
                build_tree(&rows, 0, max_depth, rng)
            })
            .collect();

        (trees, psi)
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(100, 256, 42)
    }
}

impl OutlierScorer for IsolationForest {
    fn score(&self, history: &[Vec<f64>], sample: &[f64]) -> f64 {
        if history.is_empty() {
            return 0.0;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let (trees, psi) = self.fit(history, &mut rng);

        let mean_path =
            trees.iter().map(|t| path_length(t, sample, 0)).sum::<f64>() / trees.len() as f64;

        let normaliser = average_path_length(psi);
        let isolation = if normaliser > 0.0 {
            2f64.powf(-mean_path / normaliser)
        } else {
            0.5
        };

        1.0 - 2.0 * isolation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<Vec<f64>> {
        (0..40)
            .map(|i| {
                let amount = 1000.0 + i as f64 * 10.0;
                vec![
                    amount,
                    amount * 0.18,
                    (i % 3) as f64,
                    (10 + i % 5) as f64,
                    (i / 4) as f64,
                ]
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.244).abs() < 0.01);
    }

    #[test]
    fn test_outlier_scores_below_inlier() {
        let forest = IsolationForest::default();
        let history = history();

        let inlier = forest.score(&history, &[1200.0, 216.0, 1.0, 12.0, 5.0]);
        let outlier = forest.score(&history, &[50_000.0, 9_000.0, 6.0, 31.0, 0.0]);

        assert!(outlier < inlier, "outlier {} inlier {}", outlier, inlier);
        assert!(outlier > -1.0 && outlier < 1.0);
        assert!(inlier > -1.0 && inlier < 1.0);
    }

    #[test]
    fn test_seeded_scores_are_reproducible() {
        let forest = IsolationForest::default();
        let history = history();
        let sample = [5000.0, 900.0, 4.0, 28.0, 1.0];
        assert_eq!(
            forest.score(&history, &sample).to_bits(),
            forest.score(&history, &sample).to_bits()
        );
    }

    #[test]
    fn test_degenerate_histories() {
        let forest = IsolationForest::default();
        assert_eq!(forest.score(&[], &[1.0, 2.0]), 0.0);

        // One record: single-leaf trees, neutral score
        let single = vec![vec![100.0, 18.0, 1.0, 5.0, 0.0]];
        assert_eq!(forest.score(&single, &[1_000_000.0, 0.0, 6.0, 31.0, 9.0]), 0.0);

        // Identical rows have no split to make
        let flat = vec![vec![1.0, 1.0]; 10];
        let score = forest.score(&flat, &[1.0, 1.0]);
        assert!(score.is_finite());
    }
}
