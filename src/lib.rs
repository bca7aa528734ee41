pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod time_utils;
pub mod websocket;
