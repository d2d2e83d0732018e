// src/lib.rs

pub mod auth;
pub mod chatbot;
pub mod config;
pub mod credentials;
pub mod eventbus;
pub mod platforms;

pub use chatbot::Chatbot;
pub use config::BotConfig;
pub use streamplus_common::{models, traits, AuthStage, Error};
