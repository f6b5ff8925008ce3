mod common;

use approx::assert_relative_eq;
use clipfit::domain::{OriginalIndex, RunConfig, TerminationKind};
use clipfit::error::AppError;
use clipfit::fit::{BatchRunner, ClipController, LinearLeastSquares};
use clipfit::io::MemoryLoader;

use common::*;

fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn only_the_dataset_with_an_outlier_is_clipped() {
    let loader = MemoryLoader::from_datasets([
        flat_dataset("a", 20, 0.2, &[]),
        flat_dataset("b", 20, 0.2, &[7]),
        flat_dataset("c", 20, 0.2, &[]),
    ]);
    let config = constant_config(2);
    let params = constant_params();
    let fitter = LinearLeastSquares;
    let controller = ClipController::new(&config, &params, &loader, &fitter).unwrap();

    let results = BatchRunner::new(controller).run(&sources(&["a", "b", "c"]));
    assert_eq!(results.len(), 3);

    let outcomes: Vec<_> = results
        .entries
        .iter()
        .map(|e| e.outcome.as_ref().unwrap())
        .collect();
    assert_eq!(
        outcomes.iter().map(|o| o.clipped.len()).collect::<Vec<_>>(),
        vec![0, 1, 0]
    );
    assert_eq!(outcomes[1].clipped.indices(), &[OriginalIndex::new(7)]);
    assert_eq!(outcomes[1].fit_calls, 2);
    assert_eq!(outcomes[0].fit_calls, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| o.termination == TerminationKind::Converged)
    );

    // Clipped mean of the 19 surviving rows.
    let c = outcomes[1].summary.values[0];
    assert_relative_eq!(c, 95.05 / 19.0, epsilon = 1e-9);
    assert_eq!(outcomes[1].n_points, 19);
}

#[test]
fn parallel_batch_keeps_input_order_and_isolates_failures() {
    let names = ["d0", "d1", "missing", "d3", "d4", "d5"];
    let loader = MemoryLoader::from_datasets(
        names
            .iter()
            .filter(|n| **n != "missing")
            .enumerate()
            .map(|(i, n)| flat_dataset(n, 12 + i, 0.2, &[3])),
    );
    let config = RunConfig {
        parallel: true,
        ..constant_config(2)
    };
    let params = constant_params();
    let fitter = LinearLeastSquares;
    let controller = ClipController::new(&config, &params, &loader, &fitter).unwrap();

    let results = BatchRunner::new(controller).run(&sources(&names));

    let got: Vec<&str> = results.entries.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(got, names);
    for (i, entry) in results.entries.iter().enumerate() {
        assert_eq!(entry.position, i);
    }
    assert!(matches!(results.entries[2].outcome, Err(AppError::Input(_))));
    assert_eq!(results.succeeded(), 5);

    let values = results.values();
    let errors = results.errors();
    let indices = results.indices();
    assert_eq!((values.len(), errors.len(), indices.len()), (6, 6, 6));
    assert!(values[2].is_none() && errors[2].is_none() && indices[2].is_none());
    assert!(values.iter().enumerate().all(|(i, v)| v.is_some() == (i != 2)));
    assert!(errors.iter().enumerate().all(|(i, e)| e.is_some() == (i != 2)));
    for (i, entry) in results.entries.iter().enumerate().filter(|(i, _)| *i != 2) {
        let outcome = entry.outcome.as_ref().unwrap();
        assert_eq!(outcome.clipped.indices(), &[OriginalIndex::new(3)], "dataset {i}");
    }
}

#[test]
fn clip_budget_bounds_fit_calls() {
    let loader = MemoryLoader::from_datasets([flat_dataset("a", 10, 0.2, &[])]);
    let params = constant_params();
    let fitter = AlwaysFlagFirst;

    for m in 0..4 {
        let config = constant_config(m);
        let controller = ClipController::new(&config, &params, &loader, &fitter).unwrap();
        let fit = controller.run("a").unwrap();

        assert_eq!(fit.fit_calls, m + 1);
        assert_eq!(fit.clip_record.len(), m);
        // Local row 0 of each shrunken view is the next original row.
        let expected: Vec<OriginalIndex> = (0..m).map(OriginalIndex::new).collect();
        assert_eq!(fit.clipped.indices(), expected.as_slice());
        assert_eq!(fit.clip_record.replay(10).unwrap(), fit.clipped);

        let kind = fit.termination.kind();
        if m == 0 {
            assert_eq!(kind, TerminationKind::Unclipped);
        } else {
            assert_eq!(kind, TerminationKind::BudgetExhausted);
            assert!(fit.termination.fit().outliers.is_none());
        }
    }
}

#[test]
fn sampling_sees_unit_reduced_chi_square() {
    let loader = MemoryLoader::from_datasets([flat_dataset("a", 20, 0.01, &[])]);
    let config = RunConfig {
        run_mcmc: true,
        ..constant_config(0)
    };
    let params = constant_params();
    let fitter = LinearLeastSquares;
    let sampler = RecordingSampler::default();
    let controller = ClipController::new(&config, &params, &loader, &fitter)
        .unwrap()
        .with_sampler(&sampler);

    let fit = controller.run("a").unwrap();
    let before = fit.termination.fit().chi2red;
    assert!(before > 10.0);

    let seen = sampler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (chi2red, err) = seen[0];
    assert_relative_eq!(chi2red, 1.0, epsilon = 1e-9);
    assert_relative_eq!(err, 0.01 * before.sqrt(), epsilon = 1e-12);
    assert_eq!(fit.fit_calls, 2);
}

#[test]
fn nested_sampling_without_a_sampler_fails_before_fitting() {
    let loader = MemoryLoader::from_datasets([flat_dataset("a", 20, 0.2, &[])]);
    let config = RunConfig {
        run_nested: true,
        ..constant_config(2)
    };
    let params = constant_params();
    let fitter = LinearLeastSquares;
    let controller = ClipController::new(&config, &params, &loader, &fitter).unwrap();
    assert!(matches!(controller.run("a"), Err(AppError::Input(_))));
}

#[test]
fn divergence_mid_loop_only_fails_its_own_position() {
    let loader = MemoryLoader::from_datasets([
        flat_dataset("a", 20, 0.2, &[4]),
        flat_dataset("b", 20, 0.2, &[7]),
        flat_dataset("c", 20, 0.2, &[11]),
    ]);
    let params = constant_params();

    for parallel in [false, true] {
        let config = RunConfig {
            parallel,
            ..constant_config(2)
        };
        // "b" flags its spike on the first detecting fit, then diverges on the second.
        let fitter = DivergeOn::new("b", 2);
        let controller = ClipController::new(&config, &params, &loader, &fitter).unwrap();
        let results = BatchRunner::new(controller).run(&sources(&["a", "b", "c"]));

        assert_eq!(results.succeeded(), 2);
        assert!(matches!(
            results.entries[1].outcome,
            Err(AppError::FitDivergence(_))
        ));
        let failed: Vec<usize> = results.failures().map(|(e, _)| e.position).collect();
        assert_eq!(failed, vec![1]);

        for (position, spike) in [(0, 4), (2, 11)] {
            let entry = &results.entries[position];
            let outcome = entry.outcome.as_ref().unwrap();
            assert_eq!(entry.source, ["a", "b", "c"][position]);
            assert_eq!(outcome.clipped.indices(), &[OriginalIndex::new(spike)]);
            assert_eq!(outcome.fit_calls, 2);
            assert_eq!(outcome.termination, TerminationKind::Converged);
        }
    }
}
