use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MessageChannel {
    /// Channel chat (`PRIVMSG`).
    Public,
    /// Whisper (`WHISPER`).
    Private,
}

impl fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageChannel::Public => write!(f, "Public"),
            MessageChannel::Private => write!(f, "Private"),
        }
    }
}

/// One accepted chat line. Built once by the IRC parser, never mutated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub channel: MessageChannel,
    pub message_id: String,
    pub color: String,
    pub author: String,
    pub body: String,
    pub is_broadcaster: bool,
    pub is_moderator: bool,
    pub is_subscriber: bool,
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> <{}> -> {} [ broadcaster = {} | moderator = {} | subscriber = {} ] -> {}",
            self.channel,
            self.message_id,
            self.color,
            self.author,
            self.is_broadcaster,
            self.is_moderator,
            self.is_subscriber,
            self.body
        )
    }
}
