pub mod client;
pub mod message;

pub use client::{BoxedChatStream, ChatConnector, ChatStream, ReadLoop, TcpChatConnector, TwitchIrcClient};
pub use message::{InboundLine, IrcLine, ParseContext, classify_line};
