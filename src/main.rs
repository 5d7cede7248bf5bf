use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let config = versegate::server::ServerConfig::from_env();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "versegate",
        "versegate starting: RUST_LOG='{}', http_port={}, allowlist_policy={:?}, allowlist_file={:?}, tokeninfo_url={:?}",
        rust_log, config.http_port, config.empty_policy, config.allowlist_file, config.tokeninfo_url
    );

    versegate::server::run(config).await
}
