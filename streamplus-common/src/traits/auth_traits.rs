use async_trait::async_trait;

use crate::error::Error;
use crate::models::{AuthorizationPrompt, TokenIdentity, TokenPair, UserProfile};

/// The UI side of the interactive login: show the prompt, block until a human
/// pastes the authorization code.
#[async_trait]
pub trait AuthorizationCodeProvider: Send + Sync {
    async fn request_authorization_code(&self, prompt: AuthorizationPrompt) -> Result<String, Error>;
}

/// Stateless calls to the identity provider and the token relay.
/// Each is a single request; nothing is retried.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenPair, Error>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error>;
    async fn validate(&self, access_token: &str) -> Result<TokenIdentity, Error>;
    async fn fetch_profile(&self, user_id: &str, access_token: &str) -> Result<UserProfile, Error>;
}
