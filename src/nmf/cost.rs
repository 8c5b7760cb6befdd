use std::fmt::{Display, Formatter};
use std::str::FromStr;

use approx::abs_diff_eq;
use ndarray::{ArrayView2, Zip};
use serde::Deserialize;
use tracing::warn;

use super::{floored_pow, NmfError, Result, EPSILON};

/// Value added to the approximation when the KL divergence meets a zero.
pub const KLD_EPSILON: f64 = 1e-32;

const SINGULARITY_TOLERANCE: f64 = 1e-9;

/// Cost family selector, as named on the command line and in parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostKind {
    #[default]
    Frobenius,
    Kld,
    Beta,
}

impl CostKind {
    /// Resolves the selector into a concrete cost, using `beta` for the
    /// beta-divergence family.
    pub fn model(self, beta: f64) -> CostModel {
        match self {
            CostKind::Frobenius => CostModel::Frobenius,
            CostKind::Kld => CostModel::Kld,
            CostKind::Beta => CostModel::Beta(beta),
        }
    }
}

impl FromStr for CostKind {
    type Err = NmfError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "frobenius" => Ok(CostKind::Frobenius),
            "kld" => Ok(CostKind::Kld),
            "beta" => Ok(CostKind::Beta),
            _ => Err(NmfError::InvalidCostKind(value.to_string())),
        }
    }
}

impl Display for CostKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CostKind::Frobenius => "frobenius",
            CostKind::Kld => "kld",
            CostKind::Beta => "beta",
        };
        write!(f, "{name}")
    }
}

/// Divergence between a target matrix and its approximation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CostModel {
    #[default]
    Frobenius,
    Kld,
    Beta(f64),
}

/// A cost value, and whether `KLD_EPSILON` had to be substituted for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Evaluation {
    pub cost: f64,
    pub epsilon_substituted: bool,
}

impl CostModel {
    /// Evaluates the cost of approximating `target` with `approx`.
    pub fn evaluate(&self, target: ArrayView2<'_, f64>, approx: ArrayView2<'_, f64>) -> Result<f64> {
        let evaluation = self.evaluate_unlogged(target, approx)?;
        if evaluation.epsilon_substituted {
            warn_epsilon_substitution();
        }
        Ok(evaluation.cost)
    }

    /// Like [`CostModel::evaluate`], leaving the epsilon warning to the caller.
    pub(crate) fn evaluate_unlogged(
        &self,
        target: ArrayView2<'_, f64>,
        approx: ArrayView2<'_, f64>,
    ) -> Result<Evaluation> {
        let (cost, epsilon_substituted) = match *self {
            CostModel::Frobenius => (frobenius(target, approx)?, false),
            CostModel::Kld => kld_unlogged(target, approx)?,
            CostModel::Beta(beta) => (beta_divergence(target, approx, beta)?, false),
        };
        Ok(Evaluation {
            cost,
            epsilon_substituted,
        })
    }
}

fn warn_epsilon_substitution() {
    warn!(
        epsilon = KLD_EPSILON,
        "approximation contains zeros; substituting epsilon to avoid division by zero"
    );
}

fn ensure_same_shape(target: &ArrayView2<'_, f64>, approx: &ArrayView2<'_, f64>) -> Result<()> {
    if target.dim() != approx.dim() {
        return Err(NmfError::ShapeMismatch {
            what: "approximation",
            expected: target.dim(),
            actual: approx.dim(),
        });
    }
    Ok(())
}

fn ensure_finite(cost: f64, family: &str) -> Result<f64> {
    if cost.is_finite() {
        Ok(cost)
    } else {
        Err(NmfError::NumericalInstability(format!(
            "{family} cost evaluated to {cost}"
        )))
    }
}

/// Half the squared Frobenius norm of `target - approx`.
pub fn frobenius(target: ArrayView2<'_, f64>, approx: ArrayView2<'_, f64>) -> Result<f64> {
    ensure_same_shape(&target, &approx)?;
    let sum = Zip::from(&target)
        .and(&approx)
        .fold(0.0, |acc, &x, &y| acc + (x - y).powi(2));
    Ok(0.5 * sum)
}

/// Kullback-Leibler divergence with base-10 logarithms.
///
/// When the approximation contains an exact zero, `KLD_EPSILON` is added to
/// every element before evaluating and a warning is logged. Target entries
/// equal to zero contribute only their approximation value.
pub fn kld(target: ArrayView2<'_, f64>, approx: ArrayView2<'_, f64>) -> Result<f64> {
    let (cost, epsilon_substituted) = kld_unlogged(target, approx)?;
    if epsilon_substituted {
        warn_epsilon_substitution();
    }
    Ok(cost)
}

fn kld_unlogged(target: ArrayView2<'_, f64>, approx: ArrayView2<'_, f64>) -> Result<(f64, bool)> {
    ensure_same_shape(&target, &approx)?;
    let has_zero = approx.iter().any(|&y| y.abs() == 0.0);
    let offset = if has_zero { KLD_EPSILON } else { 0.0 };
    let sum = Zip::from(&target).and(&approx).fold(0.0, |acc, &x, &y| {
        let y = y + offset;
        let log_term = if x == 0.0 { 0.0 } else { x * (x / y).log10() };
        acc + log_term - x + y
    });
    Ok((ensure_finite(sum, "kld")?, has_zero))
}

/// Generalized beta-divergence.
///
/// `beta = 1` evaluates the natural-log Kullback-Leibler limit and `beta = 0`
/// the Itakura-Saito limit. Elements raised to a negative power are floored
/// at `EPSILON`.
pub fn beta_divergence(
    target: ArrayView2<'_, f64>,
    approx: ArrayView2<'_, f64>,
    beta: f64,
) -> Result<f64> {
    ensure_same_shape(&target, &approx)?;
    if !beta.is_finite() {
        return Err(NmfError::NumericalInstability(format!(
            "beta must be finite, got {beta}"
        )));
    }

    let sum = if abs_diff_eq!(beta, 1.0, epsilon = SINGULARITY_TOLERANCE) {
        Zip::from(&target).and(&approx).fold(0.0, |acc, &x, &y| {
            let y = y.max(EPSILON);
            let log_term = if x == 0.0 { 0.0 } else { x * (x / y).ln() };
            acc + log_term - x + y
        })
    } else if abs_diff_eq!(beta, 0.0, epsilon = SINGULARITY_TOLERANCE) {
        Zip::from(&target).and(&approx).fold(0.0, |acc, &x, &y| {
            let ratio = x.max(EPSILON) / y.max(EPSILON);
            acc + ratio - ratio.ln() - 1.0
        })
    } else {
        let numerator = Zip::from(&target).and(&approx).fold(0.0, |acc, &x, &y| {
            acc + floored_pow(x, beta) + (beta - 1.0) * floored_pow(y, beta)
                - beta * x * floored_pow(y, beta - 1.0)
        });
        numerator / (beta * (beta - 1.0))
    };

    ensure_finite(sum, "beta-divergence")
}
