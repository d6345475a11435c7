use bayeslm::{run, Artifact, MemorySink, Observations, PipelineConfig, PipelineOutput};
use bayeslm_core::GroupKind;

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.report.render_dag = false;
    config
}

fn run_in_memory(config: &PipelineConfig) -> (PipelineOutput, MemorySink) {
    let mut sink = MemorySink::new();
    let output = run(config, &mut sink).unwrap();
    (output, sink)
}

#[test]
fn test_default_run_end_to_end() {
    let (output, sink) = run_in_memory(&config());

    // Observations: 100 finite rows that survive the CSV exactly.
    assert_eq!(output.observations.len(), 100);
    assert!(output
        .observations
        .x()
        .iter()
        .chain(output.observations.y())
        .all(|v| v.is_finite()));
    let reloaded = Observations::from_csv(sink.get(Artifact::Data).unwrap()).unwrap();
    assert_eq!(reloaded, output.observations);

    // Prior groups hold the three parameters and never echo the data.
    let prior = output.idata.group(GroupKind::Prior).unwrap();
    assert_eq!(prior.names(), vec!["alpha", "beta", "sigma"]);
    let observed = output.observations.y().to_vec();
    let prior_y = output
        .idata
        .group(GroupKind::PriorPredictive)
        .unwrap()
        .get("y")
        .unwrap();
    for draw in prior_y.outer_iter().next().unwrap().outer_iter() {
        assert_ne!(draw.to_vec(), observed);
    }

    // 5 chains of 1000 draws per parameter.
    let posterior = output.idata.group(GroupKind::Posterior).unwrap();
    for name in ["alpha", "beta", "sigma"] {
        assert_eq!(posterior.get(name).unwrap().len(), 5000);
    }
    assert_eq!(
        output
            .idata
            .group(GroupKind::PosteriorPredictive)
            .unwrap()
            .get("y")
            .unwrap()
            .dim(),
        (5, 1000, 100)
    );

    // Medians sit inside their 90% intervals and near the generating values.
    let truth = [("alpha", 1.0), ("beta", 2.0), ("sigma", 1.0)];
    assert_eq!(output.summary.rows.len(), 3);
    for (name, value) in truth {
        let row = output.summary.row(name).unwrap();
        assert!(row.eti_low <= row.median && row.median <= row.eti_high, "{:?}", row);
        assert!((row.median - value).abs() < 0.5, "{:?}", row);
        assert!(row.r_hat < 1.05, "{:?}", row);
    }

    let summary = String::from_utf8(sink.get(Artifact::Summary).unwrap().to_vec()).unwrap();
    assert!(summary.starts_with("parameter,median,mad,eti_5%,eti_95%,"));
    assert_eq!(summary.lines().count(), 4);
}

#[test]
fn test_artifacts_written_through_sink() {
    let mut config = config();
    config.sampling.chains = 2;
    config.sampling.draws = 200;
    config.sampling.warmup = 200;
    config.sampling.prior_draws = 100;
    let (output, sink) = run_in_memory(&config);

    let expected: Vec<Artifact> = Artifact::ALL
        .iter()
        .copied()
        .filter(|a| *a != Artifact::ModelGraph)
        .collect();
    assert_eq!(sink.artifacts(), expected);
    assert_eq!(output.artifacts.len(), expected.len());
    assert_eq!(output.artifacts[0].to_str(), Some("df.csv"));

    let png_magic = [0x89, b'P', b'N', b'G'];
    for artifact in expected {
        if artifact.file_name().ends_with(".png") {
            assert!(sink.get(artifact).unwrap().starts_with(&png_magic), "{:?}", artifact);
        }
    }
}

#[test]
fn test_same_seed_same_tables() {
    let mut config = config();
    config.sampling.chains = 2;
    config.sampling.draws = 150;
    config.sampling.warmup = 150;
    config.sampling.prior_draws = 50;
    config.sampling.num_threads = 2;
    let (_, first) = run_in_memory(&config);
    config.sampling.num_threads = 1;
    let (_, second) = run_in_memory(&config);

    for artifact in [Artifact::Data, Artifact::Summary] {
        assert_eq!(first.get(artifact), second.get(artifact), "{:?}", artifact);
    }

    config.seed += 1;
    let (_, other) = run_in_memory(&config);
    assert_ne!(first.get(Artifact::Data), other.get(Artifact::Data));
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("linear_model.toml"),
        "seed = 7\n[data]\nn_obs = 20\n[sampling]\nchains = 1\ndraws = 50\nwarmup = 50\n",
    )
    .unwrap();
    let nested = dir.path().join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();

    let config = PipelineConfig::discover_from(&nested).unwrap().unwrap();
    assert_eq!(config.seed, 7);
    assert_eq!(config.data.n_obs, 20);
    assert_eq!(config.sampling.prior_draws, 500);
    assert_eq!(config.report.ci_prob, 0.9);
}
