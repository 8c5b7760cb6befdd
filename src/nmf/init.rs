use ndarray::{Array1, Array2};
use rand::distributions::Open01;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Builds the factorizer RNG: deterministic when a seed is given, seeded from
/// OS entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => StdRng::from_entropy(),
    }
}

/// Offsets a base seed for an independent sub-problem (a frame or a note),
/// keeping results independent of the order sub-problems run in.
pub fn derive_seed(seed: Option<u64>, index: u64) -> Option<u64> {
    seed.map(|value| value.wrapping_add(index))
}

/// Matrix of uniform draws from the open interval (0, 1).
pub fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_simple_fn((rows, cols), || rng.sample::<f64, _>(Open01))
}

/// Vector of uniform draws from the open interval (0, 1).
pub fn random_vector(len: usize, rng: &mut StdRng) -> Array1<f64> {
    Array1::from_shape_simple_fn(len, || rng.sample::<f64, _>(Open01))
}
