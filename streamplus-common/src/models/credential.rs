use serde::{Deserialize, Serialize};

use crate::models::account::{AccountRole, TokenPair};

/// Stored token pair for one role. Empty strings mean "never authenticated".
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl StoredTokens {
    /// True when either token is missing; such a record needs a fresh login.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() || self.refresh_token.is_empty()
    }
}

impl From<TokenPair> for StoredTokens {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

/// Exactly one token record per role, keyed by role name on disk:
/// `{"Streamer": {...}, "Chatbot": {...}}`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    #[serde(rename = "Streamer")]
    pub streamer: StoredTokens,
    #[serde(rename = "Chatbot")]
    pub chatbot: StoredTokens,
}

impl CredentialRecord {
    pub fn get(&self, role: AccountRole) -> &StoredTokens {
        match role {
            AccountRole::Streamer => &self.streamer,
            AccountRole::Chatbot => &self.chatbot,
        }
    }

    pub fn set(&mut self, role: AccountRole, tokens: StoredTokens) {
        match role {
            AccountRole::Streamer => self.streamer = tokens,
            AccountRole::Chatbot => self.chatbot = tokens,
        }
    }
}
