//! Session events
//!
//! The normalized events a session produces, and their mapping onto the
//! `text/event-stream` wire format.

use serde_json::{json, Value};

use super::sse::encode_frame;
use crate::orchestrator::SessionReport;

/// Path under which stored images are served
pub const IMAGE_URL_PREFIX: &str = "/api/cache/image";

/// Index of an upstream task within its session
pub type TaskId = usize;

/// One event of a session's output stream
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Sent once when the session starts
    Connected { session_id: String },
    /// A text fragment from one task
    TextDelta {
        task: TaskId,
        text: String,
        /// The task's text so far, this fragment included
        accumulated: String,
    },
    /// An attachment has been persisted and can be fetched by key
    AttachmentReady {
        task: TaskId,
        key: String,
        mime_type: String,
        size: u64,
    },
    /// Number of attachments the session produced, sent before completion
    AttachmentBatch { count: usize },
    /// A task-level failure (`task` set) or a session-level one
    Error {
        task: Option<TaskId>,
        message: String,
    },
    /// Terminal event; nothing follows it
    Complete(SessionReport),
}

impl Event {
    /// The `event:` field on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "connected",
            Event::TextDelta { .. } => "text",
            Event::AttachmentReady { .. } => "image",
            Event::AttachmentBatch { .. } => "images",
            Event::Error { .. } => "error",
            Event::Complete(_) => "complete",
        }
    }

    /// The `data:` payload on the wire
    pub fn data(&self) -> Value {
        match self {
            Event::Connected { session_id } => json!({
                "status": "connected",
                "sessionId": session_id,
            }),
            Event::TextDelta {
                task,
                text,
                accumulated,
            } => json!({
                "task": task,
                "content": text,
                "accumulated": accumulated,
            }),
            Event::AttachmentReady {
                task,
                key,
                mime_type,
                size,
            } => json!({
                "task": task,
                "key": key,
                "url": image_url(key),
                "mimeType": mime_type,
                "size": size,
            }),
            Event::AttachmentBatch { count } => json!({ "count": count }),
            Event::Error { task, message } => match task {
                Some(task) => json!({ "error": message, "task": task }),
                None => json!({ "error": message }),
            },
            Event::Complete(report) => json!({
                "status": "complete",
                "sessionId": report.session_id,
                "imageCount": report.attachment_keys.len(),
                "keys": report.attachment_keys,
                "tasks": report.tasks,
                "durationMs": report.duration_ms,
            }),
        }
    }

    /// Full wire frame, `event: <name>\ndata: <json>\n\n`
    pub fn to_wire(&self) -> String {
        encode_frame(self.name(), &self.data().to_string())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Complete(_))
    }

    /// The task an event is attributed to, if any
    pub fn task(&self) -> Option<TaskId> {
        match self {
            Event::TextDelta { task, .. } | Event::AttachmentReady { task, .. } => Some(*task),
            Event::Error { task, .. } => *task,
            _ => None,
        }
    }
}

/// Public URL of a stored image
pub fn image_url(key: &str) -> String {
    format!("{}/{}", IMAGE_URL_PREFIX, key)
}
