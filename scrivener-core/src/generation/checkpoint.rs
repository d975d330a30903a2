//! Human review checkpoint.
//!
//! After planning, the run suspends until an external party answers with
//! `true` (approve) or a string (re-plan with that feedback). Any other value
//! is a contract violation and fails the run.

use super::Section;
use crate::error::CheckpointError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// What the reviewer decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointDecision {
    Approve,
    Replan(String),
}

/// Map a raw resume value onto a decision.
pub fn interpret_resume(value: &Value) -> Result<CheckpointDecision, CheckpointError> {
    match value {
        Value::Bool(true) => Ok(CheckpointDecision::Approve),
        Value::String(feedback) => Ok(CheckpointDecision::Replan(feedback.clone())),
        other => Err(CheckpointError::UnsupportedResume {
            kind: value_kind(other).to_string(),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean false",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The plan presented to the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub run_id: Uuid,
    pub prompt: String,
    pub sections: Vec<Section>,
}

impl PendingReview {
    pub fn new(run_id: Uuid, sections: &[Section]) -> Self {
        Self {
            run_id,
            prompt: render_review_prompt(sections),
            sections: sections.to_vec(),
        }
    }
}

/// Human-readable summary of a plan with the answer instructions.
pub fn render_review_prompt(sections: &[Section]) -> String {
    let plan = sections
        .iter()
        .map(|s| {
            format!(
                "Section: {}\nDescription: {}\nResearch needed: {}\n",
                s.name,
                s.description,
                if s.requires_research { "Yes" } else { "No" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Please provide feedback on the following document plan.\n\n{plan}\n\
         Does the plan meet your needs? Pass `true` to approve, or provide feedback to regenerate the plan:"
    )
}

/// Suspend/resume primitive the engine waits on.
#[async_trait]
pub trait FeedbackChannel: Send + Sync {
    /// Present `review` and wait, without timeout, for the raw resume value.
    async fn request_feedback(&self, review: PendingReview) -> Result<Value, CheckpointError>;
}

/// Approves every plan. For unattended runs.
pub struct AutoApprove;

#[async_trait]
impl FeedbackChannel for AutoApprove {
    async fn request_feedback(&self, _review: PendingReview) -> Result<Value, CheckpointError> {
        Ok(Value::Bool(true))
    }
}

/// Replays a fixed sequence of resume values, then reports the channel closed.
pub struct ScriptedFeedback {
    script: Mutex<VecDeque<Value>>,
    reviews: Mutex<Vec<PendingReview>>,
}

impl ScriptedFeedback {
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            script: Mutex::new(values.into_iter().collect()),
            reviews: Mutex::new(Vec::new()),
        }
    }

    /// Every review presented so far.
    pub fn reviews(&self) -> Vec<PendingReview> {
        self.reviews
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl FeedbackChannel for ScriptedFeedback {
    async fn request_feedback(&self, review: PendingReview) -> Result<Value, CheckpointError> {
        self.reviews
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(review);
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or(CheckpointError::ChannelClosed)
    }
}

/// A review waiting for an answer on the [`FeedbackHandle`] side.
pub struct ReviewRequest {
    pub review: PendingReview,
    reply: oneshot::Sender<Value>,
}

impl ReviewRequest {
    /// Answer with a raw value. Returns false if the run is gone.
    pub fn respond(self, value: Value) -> bool {
        self.reply.send(value).is_ok()
    }

    pub fn approve(self) -> bool {
        self.respond(Value::Bool(true))
    }

    pub fn replan(self, feedback: impl Into<String>) -> bool {
        self.respond(Value::String(feedback.into()))
    }
}

/// Channel-backed checkpoint: the engine side of an mpsc/oneshot pair.
pub struct ChannelFeedback {
    tx: mpsc::Sender<ReviewRequest>,
}

/// Reviewer side of a [`ChannelFeedback`].
pub struct FeedbackHandle {
    rx: mpsc::Receiver<ReviewRequest>,
}

impl ChannelFeedback {
    pub fn new() -> (Self, FeedbackHandle) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, FeedbackHandle { rx })
    }
}

impl FeedbackHandle {
    /// Wait for the next plan to review. `None` once the engine side is dropped.
    pub async fn next_review(&mut self) -> Option<ReviewRequest> {
        self.rx.recv().await
    }
}

#[async_trait]
impl FeedbackChannel for ChannelFeedback {
    async fn request_feedback(&self, review: PendingReview) -> Result<Value, CheckpointError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(ReviewRequest { review, reply })
            .await
            .map_err(|_| CheckpointError::ChannelClosed)?;
        answer.await.map_err(|_| CheckpointError::ChannelClosed)
    }
}
