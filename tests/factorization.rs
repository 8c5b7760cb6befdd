use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::{array, Array2};
use nmf_transcribe::nmf::cost::{frobenius, CostModel};
use nmf_transcribe::nmf::init::{random_matrix, rng_from_seed};
use nmf_transcribe::nmf::{
    factorize, factorize_frame, transcribe, transcribe_frame, BatchConfig, FrameConfig, Result,
    TranscriptionConfig, UpdateOrder,
};

fn ground_truth() -> (Array2<f64>, Array2<f64>) {
    let basis = array![[1.0, 0.2], [0.5, 0.9], [0.3, 0.4], [0.8, 0.1]];
    let activations = Array2::from_shape_fn((2, 10), |(row, col)| {
        let j = col as f64;
        if row == 0 {
            0.5 + 0.1 * j
        } else {
            1.0 - 0.05 * j
        }
    });
    (basis, activations)
}

fn sequential(rank: usize, seed: u64) -> BatchConfig {
    BatchConfig {
        update_order: UpdateOrder::Sequential,
        ..BatchConfig::default().with_rank(rank).with_seed(Some(seed))
    }
}

fn eight_bin_basis() -> Array2<f64> {
    array![
        [0.9, 0.1, 0.2],
        [0.1, 0.8, 0.1],
        [0.3, 0.2, 0.9],
        [0.05, 0.7, 0.2],
        [0.6, 0.1, 0.1],
        [0.1, 0.1, 0.7],
        [0.2, 0.9, 0.3],
        [0.4, 0.3, 0.05]
    ]
}

#[test]
fn factors_stay_non_negative_in_both_orders() -> Result<()> {
    let observed = random_matrix(6, 9, &mut rng_from_seed(Some(5)));
    for order in [UpdateOrder::Simultaneous, UpdateOrder::Sequential] {
        for iterations in 1..=5 {
            let config = BatchConfig {
                rank: 3,
                threshold: 0.0,
                max_iterations: iterations,
                update_order: order,
                seed: Some(21),
                ..BatchConfig::default()
            };
            let result = factorize(observed.view(), None, None, &config)?;
            assert_eq!(result.iterations, iterations);
            assert!(result.basis.iter().all(|&w| w >= 0.0));
            assert!(result.activations.iter().all(|&h| h >= 0.0));
        }
    }
    Ok(())
}

#[test]
fn sequential_updates_never_increase_cost() -> Result<()> {
    let (basis, activations) = ground_truth();
    let observed = basis.dot(&activations);
    for seed in 0..8 {
        let config = BatchConfig {
            threshold: 0.0,
            max_iterations: 60,
            ..sequential(2, seed)
        };
        let result = factorize(observed.view(), None, None, &config)?;
        assert_eq!(result.cost_history.len(), 60);
        for pair in result.cost_history.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1e-12 * (1.0 + pair[0]),
                "cost rose from {} to {} (seed {seed})",
                pair[0],
                pair[1]
            );
        }
    }
    Ok(())
}

#[test]
fn recovers_exact_rank_two_product() -> Result<()> {
    let (basis, activations) = ground_truth();
    let observed = basis.dot(&activations);
    let config = BatchConfig {
        threshold: 1e-6,
        max_iterations: 2_000,
        ..sequential(2, 7)
    };
    let result = factorize(observed.view(), None, None, &config)?;
    assert!(result.converged, "stopped at cost {}", result.cost);
    assert!(result.cost < 1e-6);
    assert!(result.iterations < 2_000);
    let reconstruction = result.basis.dot(&result.activations);
    for (&got, &want) in reconstruction.iter().zip(observed.iter()) {
        assert_abs_diff_eq!(got, want, epsilon = 0.05);
    }
    Ok(())
}

#[test]
fn simultaneous_order_stalls_where_sequential_converges() -> Result<()> {
    let (basis, activations) = ground_truth();
    let observed = basis.dot(&activations);
    let config = BatchConfig {
        threshold: 1e-6,
        max_iterations: 2_000,
        update_order: UpdateOrder::Simultaneous,
        ..sequential(2, 7)
    };
    let result = factorize(observed.view(), None, None, &config)?;
    assert!(!result.converged);
    assert_eq!(result.iterations, 2_000);
    assert!(result.cost > 1e-6);
    Ok(())
}

#[test]
fn beta_two_matches_frobenius() -> Result<()> {
    let mut rng = rng_from_seed(Some(99));
    let target = random_matrix(5, 5, &mut rng);
    let approx = random_matrix(5, 5, &mut rng);
    let squared = frobenius(target.view(), approx.view())?;
    let beta = CostModel::Beta(2.0).evaluate(target.view(), approx.view())?;
    assert_relative_eq!(beta, squared, max_relative = 1e-9);
    Ok(())
}

#[test]
fn frame_solver_recovers_a_single_atom() -> Result<()> {
    let basis = eight_bin_basis();
    let observed = basis.column(1).to_owned();
    let config = FrameConfig {
        beta: 2.0,
        threshold: 1e-14,
        max_iterations: 5_000,
        seed: Some(3),
        ..FrameConfig::default()
    };
    let result = factorize_frame(observed.view(), basis.view(), None, &config)?;
    for (&got, want) in result.activations.iter().zip([0.0, 1.0, 0.0]) {
        assert_abs_diff_eq!(got, want, epsilon = 1e-3);
    }
    Ok(())
}

#[test]
fn frames_are_solved_independently_of_order() -> Result<()> {
    let basis = eight_bin_basis();
    let weights = array![
        [1.0, 0.0, 0.3, 0.0, 0.5],
        [0.0, 0.7, 0.3, 0.0, 0.5],
        [0.2, 0.0, 0.0, 0.0, 0.5]
    ];
    let observed = basis.dot(&weights);

    let mut config = TranscriptionConfig::default().with_cost("beta", Some(0.5))?;
    config.frame.seed = Some(11);
    let parallel = transcribe(observed.view(), basis.view(), &config)?;
    config.parallel = false;
    let serial = transcribe(observed.view(), basis.view(), &config)?;
    assert_eq!(parallel, serial);

    for column in (0..observed.ncols()).rev() {
        let single = transcribe_frame(observed.view(), basis.view(), column, &config.frame)?;
        assert_eq!(single.activations, parallel.column(column));
    }
    // Silent frame.
    assert!(parallel.column(3).iter().all(|&h| h == 0.0));
    Ok(())
}

#[test]
fn untrained_atoms_receive_no_activation() -> Result<()> {
    let mut basis = eight_bin_basis();
    basis.column_mut(2).fill(0.0);
    let observed = basis.dot(&array![[0.4, 1.0], [0.6, 0.2], [0.0, 0.0]]);
    let config = TranscriptionConfig::default().with_cost("kld", None)?;
    let activations = transcribe(observed.view(), basis.view(), &config)?;
    assert!(activations.row(2).iter().all(|&h| h == 0.0));
    assert!(activations.row(0).iter().all(|&h| h > 0.0));
    Ok(())
}
