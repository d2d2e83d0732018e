// File: streamplus-common/src/models/account.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two fixed account purposes of a session.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AccountRole {
    Streamer,
    Chatbot,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Streamer => write!(f, "Streamer"),
            AccountRole::Chatbot => write!(f, "Chatbot"),
        }
    }
}

/// Access/refresh token pair as returned by the token relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of validating an access token against the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    /// Lowercase login name.
    pub username: String,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub display_name: String,
}

/// One platform account, mutated in place while it logs in.
#[derive(Clone)]
pub struct Account {
    pub role: AccountRole,

    pub username: String,
    pub display_name: String,
    pub user_id: String,

    pub access_token: String,
    pub refresh_token: String,

    pub is_connected: bool,
}

impl Account {
    pub fn new(role: AccountRole) -> Self {
        Self {
            role,
            username: String::new(),
            display_name: String::new(),
            user_id: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            is_connected: false,
        }
    }

    pub fn apply_tokens(&mut self, tokens: TokenPair) {
        self.access_token = tokens.access_token;
        self.refresh_token = tokens.refresh_token;
    }

    /// Clears identity and connection state, keeps tokens.
    pub fn reset_identity(&mut self) {
        self.username.clear();
        self.display_name.clear();
        self.user_id.clear();
        self.is_connected = false;
    }

    pub fn has_identity(&self) -> bool {
        !self.username.is_empty() && !self.display_name.is_empty() && !self.user_id.is_empty()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("role", &self.role)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("user_id", &self.user_id)
            .field("has_access_token", &!self.access_token.is_empty())
            .field("has_refresh_token", &!self.refresh_token.is_empty())
            .field("is_connected", &self.is_connected)
            .finish()
    }
}
