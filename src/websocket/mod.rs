// Hand-built RFC 6455 subset: opening handshake and single-frame text codec

pub mod frame;
pub mod handshake;

pub use frame::{encode_text, read_text, DEFAULT_MAX_PAYLOAD};
pub use handshake::{calculate_accept_key, negotiate};
