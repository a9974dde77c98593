//! Interactive input
//!
//! A node can ask for input mid-pass (pick an element, pick a point, type a
//! value). The pass then stops at an explicit suspension point
//! ([`PassProgress::AwaitingInput`](crate::controller::PassProgress)) and is
//! resumed with [`Pass::provide_input`](crate::controller::Pass::provide_input).
//!
//! [`InputSource`] is the async continuation used by
//! [`Pass::run_interactive`](crate::controller::Pass::run_interactive).
//! [`ChannelInputSource`] forwards requests to whatever loop owns the UI.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::identity::{IdentityRef, NodeId};

/// What kind of input a node is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    PickElement,
    PickPoint,
    Text,
}

/// A node's request for input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRequest {
    pub kind: InputKind,
    pub prompt: String,
}

impl InputRequest {
    pub fn pick_element(prompt: impl Into<String>) -> Self {
        Self {
            kind: InputKind::PickElement,
            prompt: prompt.into(),
        }
    }

    pub fn pick_point(prompt: impl Into<String>) -> Self {
        Self {
            kind: InputKind::PickPoint,
            prompt: prompt.into(),
        }
    }

    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            kind: InputKind::Text,
            prompt: prompt.into(),
        }
    }
}

/// The user's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InputResponse {
    Element(IdentityRef),
    Point([f64; 3]),
    Text(String),
    /// The user dismissed the request
    Cancelled,
}

/// Async provider of interactive input
#[async_trait]
pub trait InputSource: Send {
    /// Ask for input on behalf of `node_id`
    ///
    /// Implementations answer [`InputResponse::Cancelled`] rather than fail.
    async fn request_input(&mut self, node_id: &str, request: &InputRequest) -> InputResponse;
}

/// A request in flight on a [`ChannelInputSource`]
#[derive(Debug)]
pub struct PendingInput {
    pub node_id: NodeId,
    pub request: InputRequest,
    responder: oneshot::Sender<InputResponse>,
}

impl PendingInput {
    /// Answer the request
    pub fn respond(self, response: InputResponse) {
        if self.responder.send(response).is_err() {
            log::debug!("Input for node '{}' arrived after the pass stopped waiting", self.node_id);
        }
    }
}

/// Input source that forwards requests over an mpsc channel
pub struct ChannelInputSource {
    sender: mpsc::Sender<PendingInput>,
}

impl ChannelInputSource {
    /// Create the source and the receiving end for the UI loop
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingInput>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl InputSource for ChannelInputSource {
    async fn request_input(&mut self, node_id: &str, request: &InputRequest) -> InputResponse {
        let (responder, answer) = oneshot::channel();
        let pending = PendingInput {
            node_id: node_id.to_string(),
            request: request.clone(),
            responder,
        };

        if self.sender.send(pending).await.is_err() {
            log::warn!("Input channel closed, cancelling request from '{}'", node_id);
            return InputResponse::Cancelled;
        }

        match answer.await {
            Ok(response) => response,
            Err(_) => {
                log::warn!("Input request from '{}' dropped without an answer", node_id);
                InputResponse::Cancelled
            }
        }
    }
}
