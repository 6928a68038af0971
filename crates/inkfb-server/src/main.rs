use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inkfb_server::infrastructure::config::ServerConfig;
use inkfb_server::infrastructure::transport::SeqPacketStream;
use inkfb_server::server::Server;

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load_default().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(socket = %config.socket_path.display(), "starting inkfb server");
    let server = Server::bind(&config).context("failed to bind server socket")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        let socket_path = config.socket_path.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            // Wake the blocking accept with a throwaway connection.
            let _ = SeqPacketStream::connect(&socket_path);
        })
        .context("failed to install signal handler")?;
    }

    server.run(&shutdown).context("server loop failed")?;
    Ok(())
}
