//! src/eventbus/mod.rs
//!
//! In-process event bus. Every subscriber gets its own bounded MPSC queue.
//! Publishing never waits: a subscriber whose queue is full misses the event,
//! and subscribers that dropped their receiver are pruned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::AuthStage;
use crate::models::{AccountRole, ChatMessage, ChatbotStatus};

/// Everything the chatbot reports to the outside world.
#[derive(Debug, Clone)]
pub enum BotEvent {
    StatusChanged(ChatbotStatus),

    /// `connect()` gave up and the session is back at `Stopped`.
    ConnectFailed {
        role: Option<AccountRole>,
        stage: Option<AuthStage>,
        reason: String,
    },

    /// The read loop died while `Running`.
    ConnectionLost { reason: String },

    /// Periodic revalidation found a dead access token.
    TokenRevoked { role: AccountRole },

    ChatMessage {
        message: ChatMessage,
        received_at: DateTime<Utc>,
    },
}

impl BotEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::StatusChanged(_) => "status_changed",
            BotEvent::ConnectFailed { .. } => "connect_failed",
            BotEvent::ConnectionLost { .. } => "connection_lost",
            BotEvent::TokenRevoked { .. } => "token_revoked",
            BotEvent::ChatMessage { .. } => "chat_message",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
}

/// Default size for each subscriber's buffer.
const DEFAULT_BUFFER_SIZE: usize = 10000;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        self.subscribers.lock().await.push(tx);
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Publish an event to all subscribers without waiting on any of them.
    pub async fn publish(&self, event: BotEvent) {
        let mut subs = self.subscribers.lock().await;
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("(EventBus) subscriber queue full, dropping {}", event.event_type());
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub async fn publish_chat(&self, message: ChatMessage) {
        self.publish(BotEvent::ChatMessage {
            message,
            received_at: Utc::now(),
        })
        .await;
    }
}
