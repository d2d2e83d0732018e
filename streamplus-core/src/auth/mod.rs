// =============================================================================
// streamplus-core/src/auth/mod.rs
// =============================================================================

pub mod authenticator;
pub mod token_client;

pub use authenticator::AccountAuthenticator;
pub use token_client::TwitchTokenClient;

use crate::config::BotConfig;
use crate::models::{AccountRole, AuthorizationPrompt};

const STREAMER_SCOPES: &[&str] = &[
    "analytics:read:games",
    "bits:read",
    "channel:read:subscriptions",
    "user:edit",
    "moderation:read",
    "user:edit:broadcast",
    "user:read:broadcast",
    "channel:moderate",
];

const CHATBOT_SCOPES: &[&str] = &[
    "chat:edit",
    "chat:read",
    "whispers:read",
    "whispers:edit",
    "channel:moderate",
    "channel_editor",
];

pub fn scopes_for(role: AccountRole) -> &'static [&'static str] {
    match role {
        AccountRole::Streamer => STREAMER_SCOPES,
        AccountRole::Chatbot => CHATBOT_SCOPES,
    }
}

/// Builds the authorize URL a human has to open to log in `role`.
pub fn authorization_url(config: &BotConfig, role: AccountRole) -> String {
    let scope_str = scopes_for(role).join(" ");
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&force_verify=true&scope={}",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
        urlencoding::encode(&scope_str),
    )
}

pub fn authorization_prompt(config: &BotConfig, role: AccountRole) -> AuthorizationPrompt {
    AuthorizationPrompt {
        role,
        url: authorization_url(config, role),
        message: format!(
            "Log in with the {} account and paste the authorization code shown after the redirect",
            role
        ),
    }
}
