use collusion::mapping::alpha::{COARSE_ALPHAS, REFINE_STEPS, refine_grid, search};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn noisy_linear(seed: u64, n: usize, d: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, d), |_| rng.random_range(-1.0..1.0));
    let w = Array1::from_shape_fn(d, |_| rng.random_range(-2.0..2.0));
    let y = x.dot(&w).mapv(|v| v + rng.random_range(-0.5..0.5));
    (x, y)
}

#[test]
fn refined_alpha_lies_between_coarse_neighbours() {
    let (x, y) = noisy_linear(4, 40, 5);
    let result = search(&COARSE_ALPHAS, x.view(), y.view(), 5).unwrap();
    let idx = COARSE_ALPHAS
        .iter()
        .position(|&a| a == result.coarse)
        .expect("coarse optimum is a grid member");
    let lo = COARSE_ALPHAS[idx.saturating_sub(1)];
    let hi = COARSE_ALPHAS[(idx + 1).min(COARSE_ALPHAS.len() - 1)];
    assert!(result.refined >= lo && result.refined <= hi, "{result:?}");
}

#[test]
fn search_is_deterministic() {
    let (x, y) = noisy_linear(9, 30, 4);
    let a = search(&COARSE_ALPHAS, x.view(), y.view(), 3).unwrap();
    let b = search(&COARSE_ALPHAS, x.view(), y.view(), 3).unwrap();
    assert_eq!(a, b);
}

#[test]
fn refine_grid_is_clamped_at_the_ends() {
    let first = refine_grid(&COARSE_ALPHAS, 0.0);
    assert_eq!(first.len(), REFINE_STEPS);
    assert_eq!(first[0], 0.0);
    assert!(first.iter().all(|&a| a < 1e-4));

    let last = refine_grid(&COARSE_ALPHAS, 1e15);
    assert_eq!(last.len(), REFINE_STEPS);
    assert_eq!(last[0], 1e14);
    assert!(last.iter().all(|&a| a < 1e15));
}

#[test]
fn too_few_samples_for_folds_is_an_error() {
    let (x, y) = noisy_linear(1, 4, 2);
    assert!(search(&COARSE_ALPHAS, x.view(), y.view(), 10).is_err());
}
