use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use portico::admin::Environment;
use portico::server::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port: u16 = std::env::var("PORTICO_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7878);
    let env_name = std::env::var("PORTICO_ENV").unwrap_or_else(|_| "development".to_string());
    let privileged_domain = std::env::var("PORTICO_ADMIN_DOMAIN").unwrap_or_default();
    let environment = Environment::parse(&env_name);
    info!(
        target: "portico",
        "portico starting: RUST_LOG='{}', http_port={}, env={:?}, admin_domain='{}'",
        rust_log, http_port, environment, privileged_domain
    );

    portico::server::run_with_config(AppConfig { http_port, environment, privileged_domain }).await
}
