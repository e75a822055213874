//! Per-run workflow state
//!
//! A [`WorkflowContext`] is created from one incoming message, mutated stage by stage
//! and dropped when the run ends. It is never shared between runs.

use crate::protocol::{ChatTurn, IncomingMessage, ServiceRequest, WorkflowData};

/// Accumulated state of one workflow run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowContext {
    pub model: String,
    /// Conversation sent to every agent, oldest turn first
    pub messages: Vec<ChatTurn>,
    pub user_id: String,
    pub session_id: Option<String>,
    pub workflow_data: WorkflowData,
    /// Index of the stage being executed
    pub current_step: usize,
    /// Extra prompt attached to the next request only while set
    pub dynamic_prompt: Option<String>,
}

impl WorkflowContext {
    /// Initial state: a single user turn, no stage data, step 0
    pub fn from_message(message: &IncomingMessage, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatTurn::user(message.content())],
            user_id: message.user_id().to_string(),
            session_id: message.session_id().map(str::to_string),
            workflow_data: WorkflowData::default(),
            current_step: 0,
            dynamic_prompt: None,
        }
    }

    /// Insert turns ahead of the existing conversation, keeping their order
    pub fn prepend_messages<I>(&mut self, turns: I)
    where
        I: IntoIterator<Item = ChatTurn>,
    {
        let mut messages: Vec<ChatTurn> = turns.into_iter().collect();
        messages.append(&mut self.messages);
        self.messages = messages;
    }

    pub fn push_message(&mut self, turn: ChatTurn) {
        self.messages.push(turn);
    }

    /// Snapshot of the context in the shape agents expect
    pub fn to_service_request(&self) -> ServiceRequest {
        ServiceRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            workflow_data: self.workflow_data.clone(),
            current_step: self.current_step,
            dynamic_prompt: self.dynamic_prompt.clone(),
        }
    }
}
