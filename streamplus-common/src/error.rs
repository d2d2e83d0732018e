// src/error.rs
use std::fmt;

use thiserror::Error;

use crate::models::status::ChatbotStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Credential store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("Credential store unwritable: {0}")]
    StoreUnwritable(String),

    /// The interactive login step produced no usable code.
    #[error("Authorization code not obtained: {0}")]
    AuthorizationCode(String),

    #[error("Token exchange rejected: {0}")]
    ExchangeRejected(String),

    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    #[error("Profile lookup failed: {0}")]
    ProfileLookupFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ChatbotStatus,
        to: ChatbotStatus,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure during one login step, tagged with that step.
    #[error("{stage} failed: {source}")]
    AuthFailed {
        stage: AuthStage,
        #[source]
        source: Box<Error>,
    },
}

/// Which step of an account login produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Reading the stored token pair.
    Credentials,
    AuthorizationCode,
    Exchange,
    Validation,
    Profile,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStage::Credentials => write!(f, "credentials"),
            AuthStage::AuthorizationCode => write!(f, "authorization-code"),
            AuthStage::Exchange => write!(f, "exchange"),
            AuthStage::Validation => write!(f, "validation"),
            AuthStage::Profile => write!(f, "profile"),
        }
    }
}

impl Error {
    pub fn auth_stage(&self) -> Option<AuthStage> {
        match self {
            Error::AuthorizationCode(_) => Some(AuthStage::AuthorizationCode),
            Error::ExchangeRejected(_) => Some(AuthStage::Exchange),
            Error::TokenInvalid(_) => Some(AuthStage::Validation),
            Error::ProfileLookupFailed(_) => Some(AuthStage::Profile),
            Error::AuthFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Tags an error from login step `stage` so `auth_stage()` always names a step.
    /// Errors that already identify a step pass through unchanged.
    pub fn at_stage(self, stage: AuthStage) -> Error {
        if self.auth_stage().is_some() {
            self
        } else {
            Error::AuthFailed {
                stage,
                source: Box::new(self),
            }
        }
    }
}
