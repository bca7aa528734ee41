pub mod broadcast;
pub mod models;
pub mod registry;
pub mod server;
pub mod session;

pub use broadcast::Broadcaster;
pub use models::{ClientRequest, Message, MessageKind, ANONYMOUS};
pub use registry::{ConnectionId, NameClaim, Peer, SessionRegistry};
pub use server::ChatServer;
pub use session::{run_session, SessionContext};
