use std::ops::Range;

use parley_client::ClientError;
use parley_client::chat::TimelineRenderer;
use parley_client::view::{ChatRow, ViewType};

/// Prints the timeline to stdout, one line per message.
pub struct TerminalRenderer {
    peer_name: String,
}

impl TerminalRenderer {
    pub fn new(peer_name: impl Into<String>) -> Self {
        Self {
            peer_name: peer_name.into(),
        }
    }

    fn line(&self, row: &ChatRow) -> String {
        let who = match row.view_type {
            ViewType::Sent => "me",
            ViewType::Received => self.peer_name.as_str(),
        };
        format!("[{}] {}: {}", row.date_time, who, row.message.body)
    }
}

impl TimelineRenderer for TerminalRenderer {
    fn on_reset(&mut self, rows: &[ChatRow]) {
        if rows.is_empty() {
            return;
        }
        println!("--- {} earlier messages ---", rows.len());
        for row in rows {
            println!("{}", self.line(row));
        }
    }

    fn on_appended(&mut self, range: Range<usize>, first_changed: usize, rows: &[ChatRow]) {
        if first_changed < range.start {
            println!("--- late delivery, showing from message {} ---", first_changed + 1);
        }
        for row in rows.get(first_changed..range.end).unwrap_or_default() {
            println!("{}", self.line(row));
        }
    }

    fn on_error(&mut self, error: &ClientError) {
        eprintln!("Live updates stopped: {error}");
    }
}
