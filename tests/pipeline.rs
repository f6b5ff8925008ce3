use std::fs;

use clipfit::app::pipeline::{
    BatchRequest, CHANNEL_TABLE_FILE, RESULTS_FILE, SourceSpec, labels_for, run_batch,
};
use clipfit::data::{PARAM_FILE, SyntheticSpec, generate_channels, write_synthetic};
use clipfit::domain::RunConfig;
use clipfit::error::AppError;
use clipfit::io::RUN_CONFIG_FILE;

fn spec() -> SyntheticSpec {
    SyntheticSpec {
        n_channels: 3,
        ..SyntheticSpec::default()
    }
}

fn request(data: &std::path::Path, work: &std::path::Path, config: RunConfig) -> BatchRequest {
    BatchRequest {
        params_path: data.join(PARAM_FILE),
        sources: SourceSpec::Dir {
            dir: data.to_path_buf(),
            ext: "txt".into(),
        },
        workdir: work.to_path_buf(),
        report_index: 1,
        config,
    }
}

#[test]
fn simulated_batch_clips_injected_outliers() {
    let data = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_synthetic(data.path(), &spec()).unwrap();
    let truth = generate_channels(&spec()).unwrap();

    let config = RunConfig {
        label: "sim".into(),
        ..RunConfig::default()
    };
    let output = run_batch(&request(data.path(), work.path(), config)).unwrap();

    assert_eq!(output.labels, vec!["c0".to_string(), "v".to_string()]);
    assert_eq!(output.results.len(), 3);
    for (entry, channel) in output.results.entries.iter().zip(&truth) {
        assert!(entry.source.ends_with(channel.dataset.source()));
        let outcome = entry.outcome.as_ref().unwrap();
        for row in &channel.outliers {
            assert!(outcome.clipped.contains(*row), "{} missed {row}", entry.source);
        }
        assert!(outcome.fit_calls <= 3);
    }

    for file in [RESULTS_FILE, CHANNEL_TABLE_FILE, RUN_CONFIG_FILE, PARAM_FILE] {
        assert!(output.fit_dir.join(file).is_file(), "missing {file}");
    }
    let table = fs::read_to_string(output.fit_dir.join(CHANNEL_TABLE_FILE)).unwrap();
    let keys: Vec<&str> = table
        .lines()
        .map(|l| l.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(keys, vec!["1.1", "1.125", "1.15"]);
}

#[test]
fn mcmc_summaries_land_in_the_fit_dir() {
    let data = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_synthetic(data.path(), &SyntheticSpec { n_channels: 1, ..spec() }).unwrap();

    let config = RunConfig {
        run_mcmc: true,
        mcmc_steps: 600,
        mcmc_burn: 100,
        ..RunConfig::default()
    };
    let output = run_batch(&request(data.path(), work.path(), config)).unwrap();
    assert!(output.fit_dir.join("mcmc_speclc1.100.json").is_file());
}

#[test]
fn nested_sampling_is_rejected_up_front() {
    let data = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    write_synthetic(data.path(), &spec()).unwrap();

    let config = RunConfig {
        run_nested: true,
        ..RunConfig::default()
    };
    let err = run_batch(&request(data.path(), work.path(), config)).unwrap_err();
    assert!(matches!(err, AppError::Input(_)));
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn labels_expand_untied_parameters_per_visit() {
    let data = tempfile::tempdir().unwrap();
    write_synthetic(data.path(), &SyntheticSpec { nvisit: 2, ..spec() }).unwrap();
    let labels = labels_for(&data.path().join(PARAM_FILE), 2).unwrap();
    assert_eq!(labels, vec!["c0", "c1", "v"]);
}
