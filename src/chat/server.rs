use crate::chat::registry::SessionRegistry;
use crate::chat::session::{run_session, SessionContext};
use crate::config::{local_ip, ServerConfig};
use crate::error::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Pause after a failed accept so a full fd table doesn't spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Chat server instance: a bound listener plus the shared session registry
pub struct ChatServer {
    listener: TcpListener,
    context: SessionContext,
}

impl ChatServer {
    /// Bind the listener described by `config`
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind listener");
            e
        })?;

        let registry = Arc::new(SessionRegistry::new());
        Ok(Self {
            listener,
            context: SessionContext::new(registry, config.max_frame_bytes),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(self.context.registry())
    }

    /// Accept connections until the process ends
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Each connection gets its own task; this loop never touches client I/O.
    /// Sessions already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = self.local_addr()?;
        if local.ip().is_unspecified() {
            tracing::info!(
                "Chat server listening on {} (reachable at ws://{}:{})",
                local,
                local_ip(),
                local.port()
            );
        } else {
            tracing::info!("Chat server listening on ws://{}", local);
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
                        }
                        let context = self.context.clone();
                        tokio::spawn(run_session(stream, addr.to_string(), context));
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    },
                },
            }
        }

        Ok(())
    }
}
