//! Entry point for the Commission Engine binary.
//!
//! Running this binary starts the HTTP server.  Settings come from the
//! environment (see `config::AppConfig`); log verbosity follows
//! `RUST_LOG` and defaults to `info`.

use commission_engine::api;
use commission_engine::config::{AppConfig, LogFormat};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(blob_dir = %config.blob_dir.display(), "starting commission engine");
    api::serve(config).await
}
