use std::fmt::Display;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Local, TimeZone};

use parley_types::models::ChatMessage;

/// Which side of the conversation a row is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewType {
    Sent,
    Received,
}

/// A chat message prepared for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub message: ChatMessage,
    pub view_type: ViewType,
    pub date_time: String,
}

impl ChatRow {
    pub fn new(message: ChatMessage, current_user_id: &str) -> Self {
        let view_type = if message.sender_id == current_user_id {
            ViewType::Sent
        } else {
            ViewType::Received
        };
        let date_time = readable_date_time(&message.sent_at.with_timezone(&Local));

        Self {
            message,
            view_type,
            date_time,
        }
    }
}

/// e.g. "Mar 01, 2024 - 09:30 AM"
pub fn readable_date_time<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%b %d, %Y - %I:%M %p").to_string()
}

/// Decode a base64 profile picture. `None` if the field is empty or garbage,
/// in which case callers draw a placeholder.
pub fn decode_profile_image(encoded: &str) -> Option<Vec<u8>> {
    if encoded.is_empty() {
        return None;
    }
    B64.decode(encoded.trim()).ok()
}

/// Format a whole timeline, oldest first.
pub fn rows_for(messages: &[ChatMessage], current_user_id: &str) -> Vec<ChatRow> {
    messages
        .iter()
        .cloned()
        .map(|m| ChatRow::new(m, current_user_id))
        .collect()
}
