use crate::error::{ChatError, Result};
use crate::time_utils::chat_timestamp_now;
use serde::{Deserialize, Serialize};

/// Display name used for chat from a session that never set one
pub const ANONYMOUS: &str = "Anonymous";

/// Message kinds carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    SetUsername,
    UsernameTaken,
    UsernameSet,
    Chat,
}

/// One JSON payload, in either direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Only set on server-stamped `CHAT` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Message {
    pub fn username_taken(name: &str) -> Self {
        Self::reply(MessageKind::UsernameTaken, name)
    }

    pub fn username_set(name: &str) -> Self {
        Self::reply(MessageKind::UsernameSet, name)
    }

    fn reply(kind: MessageKind, name: &str) -> Self {
        Self {
            kind,
            username: Some(name.to_string()),
            content: None,
            timestamp: None,
        }
    }

    /// A chat line stamped with the current local time
    pub fn chat(username: &str, content: &str) -> Self {
        Self {
            kind: MessageKind::Chat,
            username: Some(username.to_string()),
            content: Some(content.to_string()),
            timestamp: Some(chat_timestamp_now()),
        }
    }

    pub fn join_notice(name: &str) -> Self {
        Self::chat(name, &format!("{} has joined the chat", name))
    }

    pub fn leave_notice(name: &str) -> Self {
        Self::chat(name, &format!("{} has left the chat", name))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What a client asked for, after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    SetUsername(String),
    Chat(String),
}

impl ClientRequest {
    /// Parse and validate one client payload.
    ///
    /// Every failure is a [`ChatError::Payload`], which the session logs and
    /// survives.
    pub fn parse(text: &str) -> Result<Self> {
        let message: Message = serde_json::from_str(text)
            .map_err(|e| ChatError::Payload(format!("invalid JSON: {}", e)))?;

        match message.kind {
            MessageKind::SetUsername => {
                let name = message
                    .username
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        ChatError::Payload("SET_USERNAME requires a non-empty username".into())
                    })?;
                Ok(ClientRequest::SetUsername(name.to_string()))
            },
            MessageKind::Chat => message
                .content
                .map(ClientRequest::Chat)
                .ok_or_else(|| ChatError::Payload("CHAT requires content".into())),
            kind @ (MessageKind::UsernameSet | MessageKind::UsernameTaken) => Err(
                ChatError::Payload(format!("{:?} is a server-only message type", kind)),
            ),
        }
    }
}
