//! `autoinf-generate`: drive the symbolic graph generator over every
//! augmented-DB file's replayable invocations (C9).

use anyhow::Context;

use autoinf::cli;
use autoinf::graph_gen::GenMethod;
use autoinf::Config;

fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    init_logging(&config);

    let method = method_from_env();
    let graph = cli::generate(&config, method).context("generating graph")?;

    tracing::info!(node_count = graph.node_count(), ?method, "generate finished");
    Ok(())
}

/// Reads `AUTOINF_GENERATE_METHOD` (`symbolic` | `concolic` | `record-matched`
/// | `hybrid`, default `hybrid`) — an unprefixed-free exception kept
/// alongside `PARALLEL`/`DEVICE` rather than folded into [`Config`], since it
/// only governs which of C9's four strategies this one binary invokes.
fn method_from_env() -> GenMethod {
    match std::env::var("AUTOINF_GENERATE_METHOD").as_deref() {
        Ok("symbolic") => GenMethod::Symbolic,
        Ok("concolic") => GenMethod::Concolic,
        Ok("record-matched") => GenMethod::RecordMatched,
        _ => GenMethod::Hybrid,
    }
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
