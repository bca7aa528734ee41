//! Time utility functions
//!
//! Provides the timestamp format stamped onto outgoing chat messages.

use chrono::{DateTime, Local, TimeZone};

/// Wire format for chat timestamps: `YYYY-MM-DD HH:MM:SS`
pub const CHAT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a point in time the way chat messages carry it
pub fn format_chat_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format(CHAT_TIMESTAMP_FORMAT).to_string()
}

/// Current local time in chat timestamp format
pub fn chat_timestamp_now() -> String {
    format_chat_timestamp(&Local::now())
}
