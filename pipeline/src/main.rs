//! Runs the linear regression pipeline with `linear_model.toml` settings
//! when one is found, defaults otherwise.

use anyhow::Context;
use bayeslm::{run, FsSink, PipelineConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("bayeslm=info,bayeslm_core=info")
        .init();

    let config = PipelineConfig::discover()
        .context("failed to read linear_model.toml")?
        .unwrap_or_default();

    let mut sink = FsSink::new(&config.report.output_dir).with_context(|| {
        format!(
            "cannot use output directory {}",
            config.report.output_dir.display()
        )
    })?;
    let output = run(&config, &mut sink).context("pipeline failed")?;

    let flagged = output.summary.flagged().len();
    if flagged > 0 {
        tracing::warn!(flagged, "some parameters did not pass convergence checks");
    }
    Ok(())
}
