use crate::error::{CartRankError, Result};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;

pub mod metrics;
pub mod validation;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Stable descending order of `scores`; equal scores keep their input order.
pub fn rank_indices(scores: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    indices
}

/// Row-major feature vectors into a dense matrix of `width` columns.
pub fn to_matrix(rows: &[Vec<f64>], width: usize) -> Result<DMatrix<f64>> {
    if let Some(bad) = rows.iter().position(|row| row.len() != width) {
        return Err(CartRankError::Data(format!(
            "feature row {} has {} values, expected {}",
            bad,
            rows[bad].len(),
            width
        )));
    }
    Ok(DMatrix::from_fn(rows.len(), width, |i, j| rows[i][j]))
}

/// Seeded shuffle split into (train, test) index sets. The test side gets
/// `ceil(n * test_fraction)` rows; both sides must end up non-empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(CartRankError::DegenerateDataset(format!(
            "cannot split {} rows with test fraction {}",
            n, test_fraction
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_rank_indices_is_stable_on_ties() {
        let scores = vec![0.4, 0.7, 0.4, 0.7];
        assert_eq!(rank_indices(&scores), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_train_test_split_is_reproducible() {
        let (train_a, test_a) = train_test_split(10, 0.2, 42).unwrap();
        let (train_b, test_b) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(test_a.len(), 2);
        assert_eq!(train_a.len(), 8);
        assert_eq!((train_a, test_a), (train_b, test_b));
        assert!(train_test_split(1, 0.2, 42).is_err());
    }

    #[test]
    fn test_to_matrix_rejects_ragged_rows() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(to_matrix(&rows, 2).is_err());
        let m = to_matrix(&rows[..1], 2).unwrap();
        assert_eq!(m[(0, 1)], 2.0);
    }
}
