use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Zip};
use serde::Deserialize;
use tracing::{trace, warn};

use super::cost::{CostKind, KLD_EPSILON};
use super::init::{random_vector, rng_from_seed};
use super::{floored_pow, NmfError, Result, EPSILON};

/// Parameters for [`factorize_frame`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Beta-divergence parameter driving the update rule, and the cost when
    /// `cost` is [`CostKind::Beta`].
    pub beta: f64,
    /// Iteration stops once the cost is at or below this value.
    pub threshold: f64,
    pub max_iterations: usize,
    pub cost: CostKind,
    /// Seed for the random initialization of absent activations.
    pub seed: Option<u64>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            beta: 0.5,
            threshold: 1e-4,
            max_iterations: 200,
            cost: CostKind::Frobenius,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameFactorization {
    /// One activation per basis column.
    pub activations: Array1<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Estimates the activations `h` of one observed frame against a fixed basis,
/// so that `observed ≈ basis · h`, with the beta-divergence multiplicative
/// rule `h ← h ⊙ (f · (Wh)^(β-2)) / (Wᵗ · (Wh)^(β-1))`.
pub fn factorize_frame(
    observed: ArrayView1<'_, f64>,
    basis: ArrayView2<'_, f64>,
    initial: Option<Array1<f64>>,
    config: &FrameConfig,
) -> Result<FrameFactorization> {
    let (bins, notes) = basis.dim();
    if observed.len() != bins {
        return Err(NmfError::ShapeMismatch {
            what: "frame",
            expected: (bins, 1),
            actual: (observed.len(), 1),
        });
    }
    if observed.iter().any(|&v| !v.is_finite() || v < 0.0) {
        return Err(NmfError::NumericalInstability(
            "frame contains negative or non-finite entries".to_string(),
        ));
    }

    let mut activations = match initial {
        Some(initial) if initial.len() == notes => initial,
        Some(initial) => {
            return Err(NmfError::ShapeMismatch {
                what: "frame activations",
                expected: (notes, 1),
                actual: (initial.len(), 1),
            })
        }
        None => random_vector(notes, &mut rng_from_seed(config.seed)),
    };

    let beta = config.beta;
    let model = config.cost.model(beta);
    let target = observed.insert_axis(Axis(1));
    // (W ⊙ v·1ᵗ)ᵗ, shared by every iteration.
    let weighted = (&basis * &target).reversed_axes();

    let mut cost = f64::INFINITY;
    let mut converged = false;
    let mut iterations = 0;
    let mut substitutions = 0usize;

    while !converged && iterations < config.max_iterations {
        let estimate = basis.dot(&activations);
        let numerator = weighted.dot(&estimate.mapv(|x| floored_pow(x, beta - 2.0)));
        let denominator = basis.t().dot(&estimate.mapv(|x| floored_pow(x, beta - 1.0)));
        Zip::from(&mut activations)
            .and(&numerator)
            .and(&denominator)
            .for_each(|h, &num, &den| *h *= num / den.max(EPSILON));

        let estimate = basis.dot(&activations);
        let evaluation = model.evaluate_unlogged(target, estimate.view().insert_axis(Axis(1)))?;
        cost = evaluation.cost;
        if evaluation.epsilon_substituted {
            substitutions += 1;
        }
        if !cost.is_finite() {
            return Err(NmfError::NumericalInstability(format!(
                "frame cost became {cost} at iteration {iterations}"
            )));
        }
        iterations += 1;
        trace!(iteration = iterations, cost, "frame update");
        converged = cost <= config.threshold;
    }

    if substitutions > 0 {
        warn!(
            epsilon = KLD_EPSILON,
            evaluations = substitutions,
            "frame approximation contains zeros; substituted epsilon in the KLD cost"
        );
    }

    Ok(FrameFactorization {
        activations,
        cost,
        iterations,
        converged,
    })
}
