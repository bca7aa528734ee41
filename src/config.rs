//! Server configuration
//!
//! Settings are layered: built-in defaults, then `SOCKETCHAT_*` environment
//! variables, then command-line flags.

use crate::error::{ChatError, Result};
use crate::websocket::DEFAULT_MAX_PAYLOAD;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, UdpSocket};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8765;

pub const ENV_HOST: &str = "SOCKETCHAT_HOST";
pub const ENV_PORT: &str = "SOCKETCHAT_PORT";
pub const ENV_MAX_FRAME_BYTES: &str = "SOCKETCHAT_MAX_FRAME_BYTES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest client frame payload accepted before the connection is dropped
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_frame_bytes: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; unset or blank variables keep the current value
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(host) = get(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.port = port.parse().map_err(|_| {
                ChatError::InvalidConfig(format!("{} must be a port number, got '{}'", ENV_PORT, port))
            })?;
        }
        if let Some(max) = get(ENV_MAX_FRAME_BYTES) {
            self.max_frame_bytes = max.parse().map_err(|_| {
                ChatError::InvalidConfig(format!(
                    "{} must be a byte count, got '{}'",
                    ENV_MAX_FRAME_BYTES, max
                ))
            })?;
        }

        self.validate()
    }

    /// Apply command-line overrides on top of the current values
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        max_frame_bytes: Option<usize>,
    ) -> Result<Self> {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(max) = max_frame_bytes {
            self.max_frame_bytes = max;
        }
        self.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.host.trim().is_empty() {
            return Err(ChatError::InvalidConfig("host must not be empty".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(ChatError::InvalidConfig(
                "max frame size must be at least one byte".into(),
            ));
        }
        Ok(self)
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn bind_addr(&self) -> String {
        match self.host.parse::<Ipv6Addr>() {
            Ok(v6) => format!("[{}]:{}", v6, self.port),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Best-effort LAN address of this machine
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface, whose address we then read back.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
