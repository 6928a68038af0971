//! The accept loop.
//!
//! One listener, one thread per accepted connection, one shared registry.
//! Connection threads are detached; each one cleans up after itself through
//! the registry when its session ends.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::registry::SurfaceRegistry;
use crate::application::session::ClientSession;
use crate::infrastructure::config::ServerConfig;
use crate::infrastructure::transport::{SeqPacketListener, TransportError};

pub struct Server {
    listener: SeqPacketListener,
    registry: Arc<SurfaceRegistry>,
}

impl Server {
    /// Binds the well-known endpoint and prepares a fresh registry.
    pub fn bind(config: &ServerConfig) -> Result<Self, TransportError> {
        let listener = SeqPacketListener::bind(&config.socket_path, config.backlog)?;
        Ok(Self {
            listener,
            registry: Arc::new(SurfaceRegistry::new()),
        })
    }

    /// The shared registry, for controller hosts and input injection.
    pub fn registry(&self) -> Arc<SurfaceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn socket_path(&self) -> &Path {
        self.listener.path()
    }

    /// Accepts connections until `shutdown` is set.
    ///
    /// `accept` is interrupted by signals; EINTR re-checks the flag and
    /// carries on, any other accept error ends the loop.
    pub fn run(&self, shutdown: &AtomicBool) -> io::Result<()> {
        info!(path = %self.socket_path().display(), "serving");
        while !shutdown.load(Ordering::SeqCst) {
            let stream = match self.listener.accept() {
                Ok(stream) => stream,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "accept failed, stopping");
                    return Err(err);
                }
            };
            let registry = Arc::clone(&self.registry);
            std::thread::Builder::new()
                .name("inkfb-session".to_string())
                .spawn(move || ClientSession::new(stream, registry).run())?;
        }
        info!("shutdown requested");
        Ok(())
    }
}
