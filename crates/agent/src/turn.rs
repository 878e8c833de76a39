//! Turn state machine
//!
//! Every event walks `Idle → Listening → Resolving → Committed`. A turn that
//! aborts returns to `Idle`. Transitions are broadcast as engine events.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use bot_nlu_core::Evidence;

/// Phase of the turn being processed for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Waiting for an event
    Idle,
    /// Understanding the utterance
    Listening,
    /// Evaluating topics
    Resolving,
    /// Decision handed out; terminal for the event
    Committed,
}

impl TurnState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, next),
            (Idle, Listening)
                | (Listening, Resolving)
                | (Resolving, Committed)
                | (Committed, Idle)
                | (Listening, Idle)
                | (Resolving, Idle)
        )
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Resolving => "resolving",
            Self::Committed => "committed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid turn transition {from} -> {to}")]
pub struct TurnError {
    pub from: TurnState,
    pub to: TurnState,
}

/// Events published by a bot runtime
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A session's turn changed phase
    StateChanged {
        bot_id: String,
        session_id: String,
        old: TurnState,
        new: TurnState,
    },
    /// The engine selected a new topic for a session
    Resolved {
        bot_id: String,
        session_id: String,
        topic: String,
        evidence: Arc<Evidence>,
    },
    /// Cached topics were dropped after a flow change
    TopicsInvalidated { bot_id: String },
}

/// One event's walk through the state machine
pub struct Turn {
    bot_id: String,
    session_id: String,
    state: TurnState,
    events: broadcast::Sender<EngineEvent>,
}

impl Turn {
    pub fn new(
        bot_id: impl Into<String>,
        session_id: impl Into<String>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            session_id: session_id.into(),
            state: TurnState::Idle,
            events,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Move to `next`, publishing the change
    pub fn advance(&mut self, next: TurnState) -> Result<(), TurnError> {
        if !self.state.can_transition_to(next) {
            return Err(TurnError {
                from: self.state,
                to: next,
            });
        }

        let old = std::mem::replace(&mut self.state, next);
        tracing::debug!(
            bot_id = %self.bot_id,
            session_id = %self.session_id,
            old = %old,
            new = %next,
            "Turn state changed"
        );
        // No subscribers is fine
        let _ = self.events.send(EngineEvent::StateChanged {
            bot_id: self.bot_id.clone(),
            session_id: self.session_id.clone(),
            old,
            new: next,
        });
        Ok(())
    }

    /// Return to `Idle` after a failure; no-op when already idle
    pub fn abort(&mut self) {
        if self.state != TurnState::Idle {
            // Every non-idle state may fall back to idle
            let _ = self.advance(TurnState::Idle);
        }
    }
}
