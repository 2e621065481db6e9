// src/broadcast/frame.rs

//! Server-sent-event text framing.

use super::message::Line;

/// `data: <line>\n\n` for a single delivered line.
pub fn data_frame(line: &Line) -> String {
    format!("data: {line}\n\n")
}

/// SSE comment; ignored by `EventSource`, used for keep-alives.
pub fn comment_frame(text: &str) -> String {
    format!(": {text}\n\n")
}
