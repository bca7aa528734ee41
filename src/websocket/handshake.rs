//! Opening handshake (HTTP/1.1 Upgrade) for incoming WebSocket connections

use crate::error::{ChatError, Result};
use base64::{engine::general_purpose, Engine as _};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Magic GUID appended to the client key before hashing (RFC 6455 section 1.3)
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest request head accepted before the blank line
pub const MAX_REQUEST_HEAD: u64 = 8 * 1024;

const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Calculate the WebSocket accept key per RFC 6455
///
/// The accept key is a SHA1 hash of the client's key concatenated with
/// the WebSocket GUID, then base64 encoded.
pub fn calculate_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// Build the 101 Switching Protocols response for a computed accept key
pub fn switching_protocols_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key
    )
}

/// A parsed upgrade request head
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub request_line: String,
    headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Parse a request head: one request line followed by `Key: Value` lines.
    pub fn parse(head: &str) -> Result<Self> {
        let mut lines = head.lines().map(|line| line.trim_end_matches('\r'));

        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| ChatError::Handshake("empty request".to_string()))?
            .to_string();

        let mut headers = Vec::new();
        for line in lines.take_while(|line| !line.is_empty()) {
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ChatError::Handshake(format!("malformed header line: {:?}", line))
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self {
            request_line,
            headers,
        })
    }

    /// Look up a header value, ignoring the case of the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn websocket_key(&self) -> Result<&str> {
        self.header(KEY_HEADER)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ChatError::Handshake(format!("missing {} header", KEY_HEADER)))
    }
}

/// Read the request head up to and including the terminating blank line.
///
/// Bytes after the blank line stay in `reader`'s buffer so frame decoding can
/// continue on the same reader.
pub async fn read_request_head<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = String::new();
    let mut limited = (&mut *reader).take(MAX_REQUEST_HEAD);

    loop {
        let start = head.len();
        let read = limited.read_line(&mut head).await?;
        if read == 0 {
            let reason = if limited.limit() == 0 {
                format!("request head exceeds {} bytes", MAX_REQUEST_HEAD)
            } else {
                "connection closed before end of request head".to_string()
            };
            return Err(ChatError::Handshake(reason));
        }

        let line = &head[start..];
        if line == "\r\n" || line == "\n" {
            return Ok(head);
        }
    }
}

/// Run the server side of the opening handshake.
///
/// On failure nothing is written; the caller drops the connection.
pub async fn negotiate<R, W>(reader: &mut R, writer: &mut W) -> Result<UpgradeRequest>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let head = read_request_head(reader).await?;
    let request = UpgradeRequest::parse(&head)?;
    let accept_key = calculate_accept_key(request.websocket_key()?);

    writer
        .write_all(switching_protocols_response(&accept_key).as_bytes())
        .await?;
    writer.flush().await?;

    Ok(request)
}
