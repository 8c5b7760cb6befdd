use ndarray::{Array2, ArrayView2, Zip};
use serde::Deserialize;
use tracing::{debug, trace};

use super::cost::frobenius;
use super::init::{random_matrix, rng_from_seed};
use super::{ensure_shape, NmfError, Result, EPSILON};

/// Which activations the basis update reads within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOrder {
    /// The basis is updated from the activations as they were before this
    /// iteration's activation update. The cost is not guaranteed to decrease
    /// under this order and can oscillate without ever reaching the
    /// threshold; use [`UpdateOrder::Sequential`] when convergence matters.
    #[default]
    Simultaneous,
    /// The basis is updated from the freshly updated activations.
    Sequential,
}

/// Parameters for [`factorize`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of basis columns (k).
    pub rank: usize,
    /// Iteration stops once the cost drops below this value.
    pub threshold: f64,
    pub max_iterations: usize,
    /// Hold the basis fixed when false.
    pub update_w: bool,
    pub update_order: UpdateOrder,
    /// Seed for the random initialization of absent factors.
    pub seed: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rank: 1,
            threshold: 1e-4,
            max_iterations: 200,
            update_w: true,
            update_order: UpdateOrder::Simultaneous,
            seed: None,
        }
    }
}

impl BatchConfig {
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Outcome of a batch factorization. Hitting the iteration cap is reported
/// through `converged`, not as an error.
#[derive(Debug, Clone)]
pub struct BatchFactorization {
    /// Basis W, `(bins × k)`.
    pub basis: Array2<f64>,
    /// Activations H, `(k × frames)`.
    pub activations: Array2<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Frobenius cost after each iteration.
    pub cost_history: Vec<f64>,
}

/// Factorizes `observed` (`bins × frames`) into `basis · activations` with
/// multiplicative updates minimizing the Frobenius cost.
///
/// Absent factors are drawn uniformly from (0, 1). A supplied basis must be
/// `(bins × rank)` and supplied activations `(rank × frames)`.
pub fn factorize(
    observed: ArrayView2<'_, f64>,
    basis: Option<Array2<f64>>,
    activations: Option<Array2<f64>>,
    config: &BatchConfig,
) -> Result<BatchFactorization> {
    let (bins, frames) = observed.dim();
    let rank = config.rank;
    if rank == 0 {
        return Err(NmfError::ShapeMismatch {
            what: "rank",
            expected: (bins, 1),
            actual: (bins, 0),
        });
    }
    ensure_non_negative(observed)?;

    let mut rng = rng_from_seed(config.seed);
    let mut basis = match basis {
        Some(basis) => {
            ensure_shape("basis", &basis, (bins, rank))?;
            basis
        }
        None => random_matrix(bins, rank, &mut rng),
    };
    let mut activations = match activations {
        Some(activations) => {
            ensure_shape("activations", &activations, (rank, frames))?;
            activations
        }
        None => random_matrix(rank, frames, &mut rng),
    };

    let mut cost = frobenius(observed, basis.dot(&activations).view())?;
    let mut cost_history = Vec::with_capacity(config.max_iterations);
    let mut converged = false;
    let mut iterations = 0;

    while !converged && iterations < config.max_iterations {
        let previous = (config.update_w && config.update_order == UpdateOrder::Simultaneous)
            .then(|| activations.clone());

        let numerator = basis.t().dot(&observed);
        let denominator = basis.t().dot(&basis).dot(&activations);
        apply_update(&mut activations, &numerator, &denominator);

        if config.update_w {
            let reference = previous.as_ref().unwrap_or(&activations);
            let numerator = observed.dot(&reference.t());
            let denominator = basis.dot(reference).dot(&reference.t());
            apply_update(&mut basis, &numerator, &denominator);
        }

        cost = frobenius(observed, basis.dot(&activations).view())?;
        if !cost.is_finite() {
            return Err(NmfError::NumericalInstability(format!(
                "cost became {cost} at iteration {iterations}"
            )));
        }
        cost_history.push(cost);
        iterations += 1;
        trace!(iteration = iterations, cost, "batch update");
        converged = cost < config.threshold;
    }

    debug!(
        bins,
        frames,
        rank,
        iterations,
        cost,
        converged,
        "batch factorization finished"
    );

    Ok(BatchFactorization {
        basis,
        activations,
        cost,
        iterations,
        converged,
        cost_history,
    })
}

/// `factor ← factor ⊙ numerator / max(denominator, EPSILON)`.
pub(crate) fn apply_update(factor: &mut Array2<f64>, numerator: &Array2<f64>, denominator: &Array2<f64>) {
    Zip::from(factor)
        .and(numerator)
        .and(denominator)
        .for_each(|value, &num, &den| *value *= num / den.max(EPSILON));
}

pub(crate) fn ensure_non_negative(observed: ArrayView2<'_, f64>) -> Result<()> {
    if observed.iter().any(|&v| !v.is_finite() || v < 0.0) {
        return Err(NmfError::NumericalInstability(
            "observation contains negative or non-finite entries".to_string(),
        ));
    }
    Ok(())
}
