use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dkv_server::{launch, Config, ServerConfig, ServerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::try_from(Config::from_args())?;
    info!(
        listen_address = %config.listen_address,
        big_map_size = config.big_map_size,
        window = config.window,
        "starting dkv-server"
    );

    let listener = TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_address))?;

    let ctx = ServerContext::new(config);
    let running = launch(ctx, listener)?;

    // The server task only finishes on failure; population and scheduler
    // loops keep running until the process exits.
    match running.server.await.context("server task aborted")? {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(%err, "server failed");
            Err(err).context("http server failed")
        }
    }
}
