//! reqwest implementation of `TokenExchange`.
//!
//! Code exchange and refresh go through the token relay (it owns the client
//! secret). Validation and profile lookup hit Twitch directly.
//! Provider answers map to the stage errors; transport failures and timeouts
//! surface as `Error::Http`.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;
use crate::config::BotConfig;
use crate::models::{TokenIdentity, TokenPair, UserProfile};
use crate::traits::TokenExchange;

#[derive(Serialize)]
struct RelayRequest<'a> {
    token: &'a str,
}

/// For /validate
#[derive(Deserialize)]
struct TwitchValidateResponse {
    login: String,
    user_id: String,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct HelixUsers {
    data: Vec<HelixUser>,
}

#[derive(Deserialize)]
struct HelixUser {
    display_name: String,
}

pub struct TwitchTokenClient {
    http: ReqwestClient,
    client_id: String,
    relay_url: String,
    validate_url: String,
    users_url: String,
}

impl TwitchTokenClient {
    pub fn new(config: &BotConfig) -> Result<Self, Error> {
        let http = ReqwestClient::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            relay_url: config.relay_url.trim_end_matches('/').to_string(),
            validate_url: config.validate_url.clone(),
            users_url: config.users_url.clone(),
        })
    }

    async fn relay_post(&self, endpoint: &str, token: &str) -> Result<TokenPair, Error> {
        let url = format!("{}/{}", self.relay_url, endpoint);
        let resp = self
            .http
            .post(&url)
            .json(&RelayRequest { token })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ExchangeRejected(format!("/{endpoint}: HTTP {status} => {text}")));
        }

        let pair: TokenPair = resp
            .json()
            .await
            .map_err(|e| Error::ExchangeRejected(format!("/{endpoint}: malformed body: {e}")))?;
        if pair.access_token.is_empty() || pair.refresh_token.is_empty() {
            return Err(Error::ExchangeRejected(format!("/{endpoint}: relay returned an empty token")));
        }
        debug!("(TwitchTokenClient) /{} => new token pair", endpoint);
        Ok(pair)
    }
}

#[async_trait]
impl TokenExchange for TwitchTokenClient {
    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenPair, Error> {
        self.relay_post("validate", code).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        self.relay_post("refresh", refresh_token).await
    }

    async fn validate(&self, access_token: &str) -> Result<TokenIdentity, Error> {
        let resp = self
            .http
            .get(&self.validate_url)
            .header("Authorization", format!("OAuth {}", access_token))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::TokenInvalid("access token unrecognized or expired".into()));
        }
        if !status.is_success() {
            return Err(Error::TokenInvalid(format!("/validate: HTTP {status}")));
        }

        let validate: TwitchValidateResponse = resp
            .json()
            .await
            .map_err(|e| Error::TokenInvalid(format!("/validate: malformed body: {e}")))?;

        debug!(
            "(TwitchTokenClient) /validate returned login={} user_id={} expires_in={}",
            validate.login, validate.user_id, validate.expires_in
        );
        Ok(TokenIdentity {
            username: validate.login,
            user_id: validate.user_id,
            scopes: validate.scopes,
            expires_in: validate.expires_in,
        })
    }

    async fn fetch_profile(&self, user_id: &str, access_token: &str) -> Result<UserProfile, Error> {
        let resp = self
            .http
            .get(&self.users_url)
            .query(&[("id", user_id)])
            .header("Client-Id", &self.client_id)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProfileLookupFailed(format!("users: HTTP {status} => {text}")));
        }

        let users: HelixUsers = resp
            .json()
            .await
            .map_err(|e| Error::ProfileLookupFailed(format!("users: malformed body: {e}")))?;

        match users.data.into_iter().next() {
            Some(user) if !user.display_name.is_empty() => Ok(UserProfile {
                display_name: user.display_name,
            }),
            _ => Err(Error::ProfileLookupFailed(format!("no user record for id={user_id}"))),
        }
    }
}
