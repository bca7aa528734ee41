use clap::Parser;
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
Socketchat - a minimal WebSocket chat server

Clients connect with a standard WebSocket handshake and exchange one JSON
object per text frame:

  {"type": "SET_USERNAME", "username": "alice"}   claim a display name
  {"type": "CHAT", "content": "hello"}            talk to everyone

The server answers USERNAME_SET or USERNAME_TAKEN privately and broadcasts
CHAT messages (joins, leaves and chat lines) to every connected client.

Configuration:
  SOCKETCHAT_HOST             bind address (default 0.0.0.0)
  SOCKETCHAT_PORT             TCP port (default 8765)
  SOCKETCHAT_MAX_FRAME_BYTES  largest accepted frame payload
  RUST_LOG                    log filter, overrides -v/-q

Command-line flags take precedence over environment variables.
"#;

#[derive(Parser, Clone, Debug)]
#[command(name = "socketchat")]
#[command(about = "Minimal WebSocket chat server with unique display names")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Address to bind (overrides SOCKETCHAT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides SOCKETCHAT_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Largest accepted client frame payload in bytes
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,

    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    /// Write logs to this file instead of stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
