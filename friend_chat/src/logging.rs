use anyhow::Context;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Installs the global subscriber; `RUST_LOG` wins over `fallback_level`.
///
/// Output goes to stderr so log lines never interleave with a streamed reply.
pub fn configure_logging(fallback_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .with_context(|| format!("invalid log level '{fallback_level}'"))?;

    let stderr_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .with_writer(std::io::stderr);
    let subscriber = Registry::default().with(filter).with(stderr_log);

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")
}
