// Per-connection control loop
//
// Connecting -> Unauthenticated -> Named -> Closed. Each accepted connection
// runs exactly one of these on its own task.

use crate::chat::broadcast::Broadcaster;
use crate::chat::models::{ClientRequest, Message, ANONYMOUS};
use crate::chat::registry::{ConnectionId, NameClaim, Peer, SessionRegistry};
use crate::error::{ChatError, Result};
use crate::websocket::{frame, handshake};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::Instrument;

/// Shared handles every session needs
#[derive(Clone)]
pub struct SessionContext {
    broadcaster: Broadcaster,
    max_payload: usize,
}

impl SessionContext {
    pub fn new(registry: Arc<SessionRegistry>, max_payload: usize) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry),
            max_payload,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.broadcaster.registry()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Unauthenticated,
    Named(String),
    Closed,
}

/// Drive one accepted connection from handshake to close.
///
/// Never returns an error: every failure is terminal for this connection
/// only and is logged inside the session span.
pub async fn run_session<S>(stream: S, addr: String, context: SessionContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = context.registry().allocate_id();
    let span = tracing::info_span!("session", connection = %id, addr = %addr);
    drive(stream, id, addr, context).instrument(span).await
}

async fn drive<S>(stream: S, id: ConnectionId, addr: String, context: SessionContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    tracing::debug!("Connection accepted");
    if let Err(e) = handshake::negotiate(&mut reader, &mut write_half).await {
        tracing::warn!(error = %e, "Handshake failed, closing connection");
        return;
    }

    let peer = Peer::new(id, addr, write_half);
    context.registry().register(peer.clone()).await;

    let mut session = Session {
        peer,
        state: SessionState::Connecting,
        context,
    };
    session.transition(SessionState::Unauthenticated);

    loop {
        let text = match frame::read_text(&mut reader, session.context.max_payload()).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!("Peer closed the connection");
                break;
            },
            Err(e) => {
                tracing::debug!(error = %e, "Connection terminated");
                break;
            },
        };

        if let Err(e) = session.handle_text(&text).await {
            if e.is_recoverable() {
                tracing::warn!(error = %e, "Ignoring malformed message");
                continue;
            }
            tracing::debug!(error = %e, "Connection terminated");
            break;
        }
    }

    session.close().await;
}

struct Session {
    peer: Peer,
    state: SessionState,
    context: SessionContext,
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        tracing::trace!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    async fn handle_text(&mut self, text: &str) -> Result<()> {
        match ClientRequest::parse(text)? {
            ClientRequest::SetUsername(name) => self.set_username(&name).await,
            ClientRequest::Chat(content) => self.chat(&content).await,
        }
    }

    async fn set_username(&mut self, name: &str) -> Result<()> {
        match self.context.registry().try_set_name(&self.peer, name).await {
            NameClaim::Unregistered => Err(ChatError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "session was dropped from the registry",
            ))),
            NameClaim::Taken => {
                tracing::debug!(username = name, "Username already taken");
                self.peer.send(&Message::username_taken(name)).await
            },
            NameClaim::Accepted => {
                tracing::info!(username = name, "Username set");
                self.peer.send(&Message::username_set(name)).await?;
                self.transition(SessionState::Named(name.to_string()));
                self.context
                    .broadcaster()
                    .broadcast(&Message::join_notice(name))
                    .await?;
                Ok(())
            },
        }
    }

    async fn chat(&self, content: &str) -> Result<()> {
        let name = self
            .context
            .registry()
            .name_of(self.peer.id())
            .await
            .unwrap_or_else(|| ANONYMOUS.to_string());
        self.context
            .broadcaster()
            .broadcast(&Message::chat(&name, content))
            .await?;
        Ok(())
    }

    async fn close(mut self) {
        self.transition(SessionState::Closed);

        if let Some(name) = self.context.registry().remove(self.peer.id()).await {
            tracing::info!(username = %name, "User left");
            if let Err(e) = self
                .context
                .broadcaster()
                .broadcast(&Message::leave_notice(&name))
                .await
            {
                tracing::warn!(error = %e, "Failed to broadcast leave notice");
            }
        }

        self.peer.shutdown().await;
        tracing::debug!("Connection closed");
    }
}
