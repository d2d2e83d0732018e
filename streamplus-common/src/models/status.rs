use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the chatbot session.
///
/// `Stopped -> Startup -> Running -> Shutdown -> Stopped`, plus the two failure
/// edges `Startup -> Stopped` (login or handshake failed) and
/// `Running -> Stopped` (connection lost).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatbotStatus {
    #[default]
    Stopped,
    Startup,
    Running,
    Shutdown,
}

impl ChatbotStatus {
    pub fn can_transition_to(self, next: ChatbotStatus) -> bool {
        use ChatbotStatus::*;
        matches!(
            (self, next),
            (Stopped, Startup)
                | (Startup, Running)
                | (Startup, Stopped)
                | (Running, Shutdown)
                | (Running, Stopped)
                | (Shutdown, Stopped)
        )
    }

    /// Label for the connect/disconnect control of a UI.
    pub fn action_label(self) -> &'static str {
        match self {
            ChatbotStatus::Stopped => "Connect",
            ChatbotStatus::Startup => "Connecting...",
            ChatbotStatus::Running => "Disconnect",
            ChatbotStatus::Shutdown => "Disconnecting...",
        }
    }
}

impl fmt::Display for ChatbotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatbotStatus::Stopped => write!(f, "Stopped"),
            ChatbotStatus::Startup => write!(f, "Startup"),
            ChatbotStatus::Running => write!(f, "Running"),
            ChatbotStatus::Shutdown => write!(f, "Shutdown"),
        }
    }
}
