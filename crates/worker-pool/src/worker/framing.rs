//! Task message framing
//!
//! A task crosses the link as a [`WireMessage`] (plain, serializable) plus a
//! list of transferables: the payload's binary attachments, moved by handle
//! rather than copied into the message body.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::task::{Payload, TaskId};

/// Serializable part of a framed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub data: serde_json::Value,
    /// Number of transferables that travel with this message
    #[serde(default)]
    pub attachment_count: usize,
}

/// A framed task ready to post to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct FramedMessage {
    pub message: WireMessage,
    pub transferables: Vec<Bytes>,
}

impl FramedMessage {
    pub fn task_id(&self) -> TaskId {
        self.message.task_id
    }
}

/// A task as seen by the worker after unframing
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub task_id: TaskId,
    pub task_type: String,
    pub payload: Payload,
}

/// Frame a task for posting
///
/// Cloning `Bytes` only bumps a reference count, so attachments are never
/// copied, including on retries.
pub fn frame(task_id: TaskId, task_type: &str, payload: &Payload) -> FramedMessage {
    FramedMessage {
        message: WireMessage {
            task_id,
            task_type: task_type.to_string(),
            data: payload.data.clone(),
            attachment_count: payload.attachments.len(),
        },
        transferables: payload.attachments.clone(),
    }
}

/// Rebuild the task on the worker side
pub fn unframe(framed: FramedMessage) -> TaskRequest {
    let FramedMessage {
        message,
        transferables,
    } = framed;

    TaskRequest {
        task_id: message.task_id,
        task_type: message.task_type,
        payload: Payload {
            data: message.data,
            attachments: transferables,
        },
    }
}
