use crate::chat::models::Message;
use crate::chat::registry::SessionRegistry;
use crate::error::Result;
use crate::websocket::encode_text;
use std::collections::VecDeque;
use std::sync::Arc;

/// Fans messages out to every registered session
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Deliver `message` to every session in the current snapshot.
    ///
    /// The message is serialized and framed once. A peer whose write fails is
    /// pruned from the registry without stopping delivery to the others; if it
    /// held a name, its leave notice is broadcast next. Returns how many peers
    /// received `message` itself.
    pub async fn broadcast(&self, message: &Message) -> Result<usize> {
        let mut pending = VecDeque::from([message.clone()]);
        let mut delivered_first = None;

        while let Some(next) = pending.pop_front() {
            let frame = encode_text(&next.to_json()?);
            let peers = self.registry.snapshot().await;

            let mut delivered = 0;
            let mut dead = Vec::new();
            for peer in &peers {
                match peer.send_frame(&frame).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!(
                            connection = %peer.id(),
                            addr = peer.addr(),
                            error = %e,
                            "Dropping peer after failed send"
                        );
                        dead.push(peer.id());
                    },
                }
            }
            delivered_first.get_or_insert(delivered);

            for id in dead {
                if let Some(name) = self.registry.remove(id).await {
                    pending.push_back(Message::leave_notice(&name));
                }
            }
        }

        Ok(delivered_first.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::registry::{NameClaim, Peer};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncWrite, DuplexStream};

    /// Writer that fails every write like a reset socket
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn connect(registry: &SessionRegistry) -> (Peer, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let peer = Peer::new(registry.allocate_id(), "duplex", server);
        registry.register(peer.clone()).await;
        (peer, client)
    }

    /// Server frames are unmasked; read one by hand
    async fn read_server_frame(client: &mut DuplexStream) -> Message {
        use tokio::io::AsyncReadExt;

        let mut header = [0u8; 2];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x81);
        let len = match header[1] {
            126 => usize::from(client.read_u16().await.unwrap()),
            127 => client.read_u64().await.unwrap() as usize,
            n => usize::from(n),
        };
        let mut payload = vec![0u8; len];
        client.read_exact(&mut payload).await.unwrap();
        serde_json::from_slice(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (_a, mut client_a) = connect(&registry).await;
        let (_b, mut client_b) = connect(&registry).await;
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let delivered = broadcaster
            .broadcast(&Message::chat("alice", "hello all"))
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        for client in [&mut client_a, &mut client_b] {
            let message = read_server_frame(client).await;
            assert_eq!(message.content.as_deref(), Some("hello all"));
        }
    }

    #[tokio::test]
    async fn test_failed_peer_is_pruned_without_aborting_delivery() {
        let registry = Arc::new(SessionRegistry::new());
        let (_a, mut client_a) = connect(&registry).await;
        let broken = Peer::new(registry.allocate_id(), "broken", BrokenPipe);
        registry.register(broken.clone()).await;
        let (_c, mut client_c) = connect(&registry).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let delivered = broadcaster
            .broadcast(&Message::chat("alice", "still here?"))
            .await
            .unwrap();

        assert_eq!(delivered, 2);
        assert!(!registry.contains(broken.id()).await);
        assert_eq!(registry.len().await, 2);
        assert_eq!(
            read_server_frame(&mut client_a).await.content.as_deref(),
            Some("still here?")
        );
        assert_eq!(
            read_server_frame(&mut client_c).await.content.as_deref(),
            Some("still here?")
        );
    }

    #[tokio::test]
    async fn test_pruned_named_peer_gets_one_leave_notice() {
        let registry = Arc::new(SessionRegistry::new());
        let (_a, mut client_a) = connect(&registry).await;
        let broken = Peer::new(registry.allocate_id(), "broken", BrokenPipe);
        registry.register(broken.clone()).await;
        registry.try_set_name(&broken, "ghost").await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        broadcaster
            .broadcast(&Message::chat("alice", "ping"))
            .await
            .unwrap();

        assert_eq!(
            read_server_frame(&mut client_a).await.content.as_deref(),
            Some("ping")
        );
        let leave = read_server_frame(&mut client_a).await;
        assert_eq!(leave.username.as_deref(), Some("ghost"));
        assert_eq!(leave.content.as_deref(), Some("ghost has left the chat"));

        // The session's own cleanup finds nothing left to announce
        assert!(registry.remove(broken.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_pruned_peer_cannot_claim_a_name_afterwards() {
        let registry = Arc::new(SessionRegistry::new());
        let (_a, mut client_a) = connect(&registry).await;
        let broken = Peer::new(registry.allocate_id(), "broken", BrokenPipe);
        registry.register(broken.clone()).await;
        registry.try_set_name(&broken, "ghost").await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        broadcaster
            .broadcast(&Message::chat("alice", "anyone?"))
            .await
            .unwrap();
        assert!(!registry.contains(broken.id()).await);

        assert_eq!(
            registry.try_set_name(&broken, "ghost2").await,
            NameClaim::Unregistered
        );
        assert!(!registry.contains(broken.id()).await);
        assert!(registry.remove(broken.id()).await.is_none());
        assert!(registry.names().await.is_empty());

        // Only the original message and one leave notice went out
        assert_eq!(
            read_server_frame(&mut client_a).await.content.as_deref(),
            Some("anyone?")
        );
        assert_eq!(
            read_server_frame(&mut client_a).await.content.as_deref(),
            Some("ghost has left the chat")
        );
        let mut next_byte = [0u8; 1];
        let silent = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            tokio::io::AsyncReadExt::read(&mut client_a, &mut next_byte),
        )
        .await;
        assert!(silent.is_err());
    }

    #[tokio::test]
    async fn test_large_message_uses_extended_length() {
        let registry = Arc::new(SessionRegistry::new());
        let (_a, mut client_a) = connect(&registry).await;
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let content = "z".repeat(70_000);
        let send = {
            let broadcaster = broadcaster.clone();
            let content = content.clone();
            tokio::spawn(async move {
                broadcaster
                    .broadcast(&Message::chat("bulk", &content))
                    .await
            })
        };

        let message = read_server_frame(&mut client_a).await;
        assert_eq!(message.content.as_deref(), Some(content.as_str()));
        assert_eq!(send.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let broadcaster = Broadcaster::new(Arc::new(SessionRegistry::new()));
        let delivered = broadcaster
            .broadcast(&Message::chat("nobody", "echo"))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }
}
