//! `autoinf-infer-shapes`: synthesise shape rules for every augmented-DB
//! file under `out_dir` (C6 + C1).

use anyhow::Context;

use autoinf::cli;
use autoinf::worker_pool;
use autoinf::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    init_logging(&config);

    let pool = worker_pool::build_pool(&config).context("building worker pool")?;
    let summary = cli::infer_shapes(&config, &pool);

    tracing::info!(completed = summary.completed, failed = summary.failed, "infer-shapes finished");
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
