use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ra_connection::{LocalConnection, SharedRegistry};
use ra_types::TextRules;
use tracing::{debug, info, warn};

use crate::auth::{AuthProvider, StaticAuth};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::session::Session;

/// RA store server. Every accepted client gets its own thread and its own
/// view of the store; the GUID registry is loaded once and shared.
pub struct RaServer {
    config: Arc<ServerConfig>,
    auth: Arc<dyn AuthProvider>,
    registry: SharedRegistry,
    listener: TcpListener,
    active: Arc<AtomicUsize>,
}

/// Decrements the live-session count when a session thread ends.
struct SessionSlot(Arc<AtomicUsize>);

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RaServer {
    /// Bind the listening socket, authenticating against the config's user
    /// table.
    pub fn bind(config: ServerConfig) -> ServerResult<Self> {
        let auth = StaticAuth::from_config(&config);
        Self::bind_with_auth(config, Arc::new(auth))
    }

    pub fn bind_with_auth(config: ServerConfig, auth: Arc<dyn AuthProvider>) -> ServerResult<Self> {
        if !config.store_root.is_dir() {
            return Err(ServerError::Config(format!(
                "store root {} is not a directory",
                config.store_root.display()
            )));
        }
        let registry = LocalConnection::open(&config.store_root, TextRules::none())?
            .shared_registry();
        let listener = TcpListener::bind(config.bind_addr)?;
        Ok(Self {
            config: Arc::new(config),
            auth,
            registry,
            listener,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The bound address; differs from the configured one when port 0 was
    /// asked for.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the listener fails.
    pub fn serve(self) -> ServerResult<()> {
        info!(
            addr = %self.local_addr()?,
            root = %self.config.store_root.display(),
            "RA server listening"
        );
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => self.accept(stream),
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        Ok(())
    }

    /// Serve on a background thread.
    pub fn spawn(self) -> ServerResult<thread::JoinHandle<ServerResult<()>>> {
        Ok(thread::Builder::new()
            .name("ra-server".into())
            .spawn(move || self.serve())?)
    }

    fn accept(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        if self.active.fetch_add(1, Ordering::SeqCst) >= self.config.max_sessions {
            self.active.fetch_sub(1, Ordering::SeqCst);
            warn!(%peer, max = self.config.max_sessions, "session limit reached, refusing");
            return;
        }
        let slot = SessionSlot(Arc::clone(&self.active));
        let config = Arc::clone(&self.config);
        let auth = Arc::clone(&self.auth);
        let registry = Arc::clone(&self.registry);
        let spawned = thread::Builder::new()
            .name(format!("ra-session-{peer}"))
            .spawn(move || {
                let _slot = slot;
                if let Err(e) = run_session(stream, &peer, &config, auth.as_ref(), registry) {
                    warn!(%peer, error = %e, "session ended with error");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not start session thread");
        }
    }
}

fn run_session(
    stream: TcpStream,
    peer: &str,
    config: &ServerConfig,
    auth: &dyn AuthProvider,
    registry: SharedRegistry,
) -> ServerResult<()> {
    stream.set_nodelay(true)?;
    let session = Session::login(stream, peer, config, auth, registry)?;
    debug!(peer, user = %session.identity().name, "serving requests");
    session.run()
}
