// Session registry: every live connection and the display name it holds
//
// One RwLock covers the whole table. It is only held for in-memory work;
// network writes happen on snapshots taken outside the lock.

use crate::chat::models::Message;
use crate::error::Result;
use crate::websocket::encode_text;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};

/// Outbound half of a connection, type-erased so tests can use in-memory pipes
pub type PeerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Stable per-process identity of one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Write handle for one connection
///
/// Clones share the same writer; the inner mutex keeps whole frames from
/// interleaving when a private reply and a broadcast race.
#[derive(Clone)]
pub struct Peer {
    id: ConnectionId,
    addr: String,
    writer: Arc<Mutex<PeerWriter>>,
}

impl Peer {
    pub fn new<W>(id: ConnectionId, addr: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            addr: addr.into(),
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Write an already encoded frame
    pub async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Serialize and send one message to this peer only
    pub async fn send(&self, message: &Message) -> Result<()> {
        let frame = encode_text(&message.to_json()?);
        self.send_frame(&frame).await
    }

    /// Close the outbound direction; errors are irrelevant at this point
    pub async fn shutdown(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish()
    }
}

/// Outcome of claiming a display name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClaim {
    Accepted,
    Taken,
    /// The connection is no longer registered, e.g. pruned after a failed write
    Unregistered,
}

struct SessionEntry {
    peer: Peer,
    name: Option<String>,
}

/// Shared table of connected sessions
///
/// Invariant: no two entries hold equal non-empty names.
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<ConnectionId, SessionEntry>>,
    next_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hand out the identity for a newly accepted connection
    pub fn allocate_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add an unnamed session so it starts receiving broadcasts
    pub async fn register(&self, peer: Peer) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(peer.id()).or_insert(SessionEntry { peer, name: None });
    }

    /// Bind `name` to `peer` unless another connection already holds it.
    ///
    /// Re-claiming one's own name is accepted. A successful claim releases
    /// whatever name the connection held before. A connection that is not
    /// registered never gets a name and is not put back.
    pub async fn try_set_name(&self, peer: &Peer, name: &str) -> NameClaim {
        let mut sessions = self.sessions.write().await;

        if !sessions.contains_key(&peer.id()) {
            return NameClaim::Unregistered;
        }

        let taken = sessions
            .iter()
            .any(|(id, entry)| *id != peer.id() && entry.name.as_deref() == Some(name));
        if taken {
            return NameClaim::Taken;
        }

        match sessions.get_mut(&peer.id()) {
            Some(entry) => {
                entry.name = Some(name.to_string());
                NameClaim::Accepted
            },
            None => NameClaim::Unregistered,
        }
    }

    /// Drop a session, returning the name it held
    pub async fn remove(&self, id: ConnectionId) -> Option<String> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .and_then(|entry| entry.name)
    }

    pub async fn name_of(&self, id: ConnectionId) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(&id)
            .and_then(|entry| entry.name.clone())
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Copy of every registered peer, in connection order
    pub async fn snapshot(&self) -> Vec<Peer> {
        self.sessions
            .read()
            .await
            .values()
            .map(|entry| entry.peer.clone())
            .collect()
    }

    /// Names currently bound, in connection order
    pub async fn names(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .values()
            .filter_map(|entry| entry.name.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
