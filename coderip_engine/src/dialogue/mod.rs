//! Conversation state with the agent.
//!
//! The log holds one system entry followed by user/assistant turns. The
//! system entry is rewritten before every call, and only the most recent
//! turns are kept. A turn is bracketed by [`DialogueSession::begin_turn`] and
//! [`DialogueSession::finish_turn`]; the ticket handed out in between
//! carries a generation so answers to abandoned turns can be recognised.

pub mod briefing;
pub mod transport;

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::error::{TransportError, TurnError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Handle for one outstanding call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTicket {
    pub generation: u64,
    /// Object whose inspection started this turn, if any.
    pub analyzing: Option<String>,
    user_text: String,
}

impl TurnTicket {
    pub fn user_text(&self) -> &str {
        &self.user_text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResolution {
    Answered(String),
    /// The call failed; the log is unchanged and the message awaits a retry.
    Failed(TransportError),
    /// The ticket no longer matches the outstanding turn; its answer is dropped.
    Stale,
}

#[derive(Debug, Clone)]
pub struct DialogueSession {
    system: ChatMessage,
    turns: Vec<ChatMessage>,
    window: usize,
    model: String,
    temperature: f32,
    max_tokens: u32,
    generation: u64,
    in_flight: Option<TurnTicket>,
    pending_user: Option<String>,
}

impl DialogueSession {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            system: ChatMessage::new(ChatRole::System, String::new()),
            turns: Vec::new(),
            window: config.history_window.max(1),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            generation: 0,
            in_flight: None,
            pending_user: None,
        }
    }

    /// System entry followed by the kept turns.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        std::iter::once(&self.system).chain(self.turns.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system.content
    }

    pub fn in_flight(&self) -> Option<&TurnTicket> {
        self.in_flight.as_ref()
    }

    pub fn pending_user(&self) -> Option<&str> {
        self.pending_user.as_deref()
    }

    /// Start a turn with a freshly built briefing.
    pub fn begin_turn(
        &mut self,
        briefing: String,
        user_text: String,
        analyzing: Option<String>,
    ) -> Result<(TurnTicket, ChatRequest), TurnError> {
        if self.in_flight.is_some() {
            return Err(TurnError::TurnInFlight);
        }
        self.system.content = briefing;
        self.truncate();

        let mut history: Vec<ChatMessage> = self.turns.clone();
        history.push(ChatMessage::new(ChatRole::User, user_text.clone()));
        let skip = history.len().saturating_sub(self.window);
        let mut messages = Vec::with_capacity(1 + history.len() - skip);
        messages.push(self.system.clone());
        messages.extend(history.into_iter().skip(skip));

        self.generation += 1;
        self.pending_user = None;
        let ticket = TurnTicket {
            generation: self.generation,
            analyzing,
            user_text,
        };
        self.in_flight = Some(ticket.clone());
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        Ok((ticket, request))
    }

    pub fn finish_turn(
        &mut self,
        ticket: &TurnTicket,
        result: Result<String, TransportError>,
    ) -> TurnResolution {
        let current = self.in_flight.as_ref().map(|ticket| ticket.generation);
        if current != Some(ticket.generation) {
            log::debug!(
                "dropping answer for turn {} (outstanding: {current:?})",
                ticket.generation
            );
            return TurnResolution::Stale;
        }
        self.in_flight = None;
        match result {
            Ok(reply) => {
                self.turns
                    .push(ChatMessage::new(ChatRole::User, ticket.user_text.clone()));
                self.turns
                    .push(ChatMessage::new(ChatRole::Assistant, reply.clone()));
                self.truncate();
                TurnResolution::Answered(reply)
            }
            Err(error) => {
                log::warn!("agent call failed: {error}");
                self.pending_user = Some(ticket.user_text.clone());
                TurnResolution::Failed(error)
            }
        }
    }

    /// Abandon the outstanding turn; its message awaits a retry.
    pub fn cancel_turn(&mut self) -> Option<TurnTicket> {
        let ticket = self.in_flight.take()?;
        self.pending_user = Some(ticket.user_text.clone());
        Some(ticket)
    }

    /// Take the unanswered message so it can be sent again.
    pub fn take_pending(&mut self) -> Result<String, TurnError> {
        if self.in_flight.is_some() {
            return Err(TurnError::TurnInFlight);
        }
        self.pending_user.take().ok_or(TurnError::NoPendingTurn)
    }

    fn truncate(&mut self) {
        if self.turns.len() > self.window {
            let excess = self.turns.len() - self.window;
            self.turns.drain(..excess);
        }
    }
}
