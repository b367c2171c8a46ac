use tidepool::{server, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tidepool=info,info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = config.port,
        data_dir = %config.data_dir.display(),
        redis = %config.redis_addr,
        "starting tidepool"
    );

    if let Err(e) = server::run(config).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
