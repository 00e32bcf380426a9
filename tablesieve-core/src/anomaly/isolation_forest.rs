//! Isolation forest outlier scoring (Liu, Ting & Zhou, 2008).
//!
//! Points that are isolated by fewer random axis-aligned splits are more
//! anomalous. Scores follow the usual convention of the "normal-ness" score:
//! the negated anomaly score, so lower means more anomalous.

use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` points, used to normalize path lengths.
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
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

impl Node {
    fn path_length(&self, point: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point[*feature] < *threshold {
                    left.path_length(point, depth.saturating_add(1))
                } else {
                    right.path_length(point, depth.saturating_add(1))
                }
            }
        }
    }
}

/// A fitted isolation forest.
#[derive(Debug)]
pub(crate) struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fits a forest on a row-major feature matrix.
    ///
    /// Every row must have the same width and only finite values.
    pub(crate) fn fit(
        data: &[Vec<f64>],
        n_estimators: usize,
        max_samples: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = max_samples.min(data.len()).max(1);
        let depth_limit = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..n_estimators)
            .map(|_| {
                let indices = if sample_size >= data.len() {
                    (0..data.len()).collect()
                } else {
                    rand::seq::index::sample(&mut rng, data.len(), sample_size).into_vec()
                };
                build_tree(data, indices, 0, depth_limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Normal-ness score per row: `-2^(-E[h(x)] / c(sample_size))`.
    pub(crate) fn score_samples(&self, data: &[Vec<f64>]) -> Vec<f64> {
        let normalizer = average_path_length(self.sample_size);
        let tree_count = self.trees.len().max(1) as f64;

        data.iter()
            .map(|point| {
                let mean_path = self
                    .trees
                    .iter()
                    .map(|tree| tree.path_length(point, 0))
                    .sum::<f64>()
                    / tree_count;
                let anomaly = if normalizer > 0.0 {
                    2f64.powf(-mean_path / normalizer)
                } else {
                    // Single-row subsamples carry no isolation information
                    0.5
                };
                -anomaly
            })
            .collect()
    }
}

fn build_tree(
    data: &[Vec<f64>],
    indices: Vec<usize>,
    depth: usize,
    depth_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= depth_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let width = data.get(indices[0]).map_or(0, Vec::len);
    let candidates: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (min, max) = indices.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &i| {
                    let v = data[i][feature];
                    (lo.min(v), hi.max(v))
                },
            );
            (min < max).then_some((feature, min, max))
        })
        .collect();

    let Some(&(feature, min, max)) = candidates.choose(rng) else {
        // Every remaining point is identical
        return Node::Leaf {
            size: indices.len(),
        };
    };

    let threshold = match Uniform::new(min, max) {
        Ok(dist) => dist.sample(rng),
        Err(_) => min / 2.0 + max / 2.0,
    };

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .into_iter()
        .partition(|&i| data[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(data, left, depth.saturating_add(1), depth_limit, rng)),
        right: Box::new(build_tree(data, right, depth.saturating_add(1), depth_limit, rng)),
    }
}

/// Linear-interpolated percentile of `values`, `q` in [0, 100].
pub(crate) fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (q / 100.0).clamp(0.0, 1.0) * sorted.len().saturating_sub(1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn gaussian_like(rng: &mut StdRng, center: f64, spread: f64) -> f64 {
        // Sum of uniforms approximates a bell curve
        let sum: f64 = (0..6).map(|_| rng.random_range(-1.0..1.0)).sum();
        center + spread * sum / 6.0
    }

    fn cluster_with_outlier(n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data: Vec<Vec<f64>> = (0..n - 1)
            .map(|_| {
                vec![
                    gaussian_like(&mut rng, 50.0, 10.0),
                    gaussian_like(&mut rng, 5.0, 1.0),
                ]
            })
            .collect();
        data.push(vec![5_000.0, 90.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is roughly 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn test_outlier_scores_lowest() {
        let data = cluster_with_outlier(60, 7);
        let forest = IsolationForest::fit(&data, 100, 256, 42);
        let scores = forest.score_samples(&data);

        let (lowest, _) = scores
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(lowest, data.len() - 1);
        assert!(scores.iter().all(|s| (-1.0..0.0).contains(s)));
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let data = cluster_with_outlier(40, 3);
        let first = IsolationForest::fit(&data, 50, 256, 42).score_samples(&data);
        let second = IsolationForest::fit(&data, 50, 256, 42).score_samples(&data);
        assert_eq!(first, second);
    }

    #[test]
    fn test_constant_data_scores_uniformly() {
        let data = vec![vec![1.0, 2.0]; 10];
        let scores = IsolationForest::fit(&data, 20, 256, 42).score_samples(&data);
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_subsampling_smaller_than_data() {
        let data = cluster_with_outlier(300, 11);
        let forest = IsolationForest::fit(&data, 30, 64, 42);
        assert_eq!(forest.sample_size, 64);
        assert_eq!(forest.score_samples(&data).len(), 300);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        assert_eq!(percentile(&values, 12.5), Some(1.5));
        assert_eq!(percentile(&[], 5.0), None);
    }
}
