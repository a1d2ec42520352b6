use collusion::rsa::dissimilarity::{Metric, compute, compute_scalar};
use ndarray::{Array1, Array2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_representation(seed: u64, n: usize, d: usize) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, d), |_| rng.random_range(-2.0..2.0))
}

#[test]
fn every_metric_is_symmetric_non_negative_with_zero_diagonal() {
    let m = random_representation(11, 12, 5);
    for metric in Metric::ALL {
        let rdm = compute(&m, metric);
        let a = rdm.as_array();
        assert_eq!(a.dim(), (12, 12), "{metric}");
        for i in 0..12 {
            assert_eq!(a[[i, i]], 0.0, "{metric} diagonal at {i}");
            for j in 0..12 {
                assert_eq!(a[[i, j]], a[[j, i]], "{metric} symmetry at ({i}, {j})");
                assert!(a[[i, j]] >= 0.0, "{metric} negative at ({i}, {j})");
            }
        }
    }
}

#[test]
fn euclidean_matches_hand_computed_distances() {
    let m = array![[0.0, 0.0], [3.0, 4.0], [0.0, 4.0], [3.0, 0.0]];
    let rdm = compute(&m, Metric::Euclidean);
    let expected = array![
        [0.0, 5.0, 4.0, 3.0],
        [5.0, 0.0, 3.0, 4.0],
        [4.0, 3.0, 0.0, 5.0],
        [3.0, 4.0, 5.0, 0.0],
    ];
    for (got, want) in rdm.as_array().iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-6, "{got} vs {want}");
    }
}

#[test]
fn all_zero_representation_gives_all_zero_matrix() {
    let m = Array2::<f64>::zeros((5, 3));
    for metric in Metric::ALL {
        let rdm = compute(&m, metric);
        assert!(
            rdm.as_array().iter().all(|&v| v == 0.0),
            "{metric} should not produce non-zero or NaN entries"
        );
    }
}

#[test]
fn scalar_rdm_is_absolute_difference() {
    let values = Array1::from_vec(vec![1.0, 4.0, -2.0]);
    let rdm = compute_scalar(values.view());
    let a = rdm.as_array();
    assert_eq!(a[[0, 1]], 3.0);
    assert_eq!(a[[0, 2]], 3.0);
    assert_eq!(a[[1, 2]], 6.0);
    assert_eq!(a[[2, 1]], 6.0);
}

#[test]
fn correlation_distance_ignores_offset_and_scale() {
    let m = array![[1.0, 2.0, 3.0], [11.0, 12.0, 13.0], [2.0, 4.0, 6.0], [3.0, 2.0, 1.0]];
    let rdm = compute(&m, Metric::Correlation);
    let a = rdm.as_array();
    assert!(a[[0, 1]].abs() < 1e-12);
    assert!(a[[0, 2]].abs() < 1e-12);
    assert!((a[[0, 3]] - 2.0).abs() < 1e-12);
}

#[test]
fn representation_without_columns_gives_zero_matrix() {
    let m = Array2::<f64>::zeros((5, 0));
    for metric in Metric::ALL {
        let rdm = compute(&m, metric);
        assert_eq!(rdm.as_array(), &Array2::<f64>::zeros((5, 5)), "{metric}");
    }
}

#[test]
fn single_feature_is_scored_euclidean_for_every_metric() {
    let m = array![[1.0], [2.0], [-3.0], [5.0]];
    let expected = compute_scalar(m.column(0));
    assert_eq!(expected.as_array().row(0).to_vec(), vec![0.0, 1.0, 4.0, 4.0]);
    for metric in Metric::ALL {
        assert_eq!(compute(&m, metric), expected, "{metric}");
    }
}
