use serde::{Deserialize, Serialize};

use crate::models::account::AccountRole;

/// What the UI has to show a human so they can log in `role` and hand back
/// the resulting authorization code.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AuthorizationPrompt {
    pub role: AccountRole,
    pub url: String,
    pub message: String,
}
