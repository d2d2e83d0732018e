pub mod account;
pub mod auth;
pub mod chat;
pub mod credential;
pub mod status;

pub use account::{Account, AccountRole, TokenIdentity, TokenPair, UserProfile};
pub use auth::AuthorizationPrompt;
pub use chat::{ChatMessage, MessageChannel};
pub use credential::{CredentialRecord, StoredTokens};
pub use status::ChatbotStatus;
