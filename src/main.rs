use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("HOSTELRY_HTTP_PORT").unwrap_or_else(|_| "8080".to_string());
    let directory_url =
        std::env::var("HOSTELRY_DIRECTORY_URL").unwrap_or_else(|_| "<unset>".to_string());
    let cache_ttl =
        std::env::var("HOSTELRY_RESOLVER_CACHE_TTL_SECS").unwrap_or_else(|_| "0".to_string());
    info!(
        target: "startup",
        "hostelry starting: RUST_LOG='{}', http_port={}, directory_url='{}', resolver_cache_ttl_secs={}",
        rust_log, http_port, directory_url, cache_ttl
    );

    hostelry::server::run().await
}
