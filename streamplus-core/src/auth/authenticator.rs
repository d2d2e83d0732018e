// streamplus-core/src/auth/authenticator.rs
//
// Drives one account through load -> (login | refresh) -> persist -> validate -> profile.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{AuthStage, Error};
use crate::auth::authorization_prompt;
use crate::config::BotConfig;
use crate::models::{Account, StoredTokens, TokenPair};
use crate::traits::{AuthorizationCodeProvider, CredentialStore, TokenExchange};

pub struct AccountAuthenticator {
    config: Arc<BotConfig>,
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    code_provider: Arc<dyn AuthorizationCodeProvider>,
}

impl AccountAuthenticator {
    pub fn new(
        config: Arc<BotConfig>,
        store: Arc<dyn CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        code_provider: Arc<dyn AuthorizationCodeProvider>,
    ) -> Self {
        Self {
            config,
            store,
            exchange,
            code_provider,
        }
    }

    /// Logs `account` in, filling its tokens and identity in place.
    ///
    /// A stored token pair is refreshed; a missing one triggers the interactive
    /// login. On success `is_connected` is true and username, user id and
    /// display name are all non-empty. On failure `is_connected` stays false
    /// and `Error::auth_stage()` names the step that failed.
    pub async fn authenticate(&self, account: &mut Account) -> Result<(), Error> {
        account.reset_identity();
        let role = account.role;

        let stored = self
            .store
            .load()
            .await
            .map_err(|e| e.at_stage(AuthStage::Credentials))?
            .get(role)
            .clone();

        let tokens = if stored.is_empty() {
            info!("(AccountAuthenticator) {} has no stored tokens, starting interactive login", role);
            let code = self.request_code(account).await?;
            self.exchange
                .exchange_authorization_code(&code)
                .await
                .map_err(|e| e.at_stage(AuthStage::Exchange))?
        } else {
            debug!("(AccountAuthenticator) {} refreshing stored tokens", role);
            self.refresh_or_forget(account, &stored.refresh_token).await?
        };

        self.persist(account, tokens).await;

        let identity = match self.exchange.validate(&account.access_token).await {
            Ok(identity) => identity,
            Err(e) => {
                if matches!(e, Error::TokenInvalid(_)) {
                    self.forget_tokens(account).await;
                }
                return Err(e.at_stage(AuthStage::Validation));
            }
        };
        if identity.username.is_empty() || identity.user_id.is_empty() {
            return Err(Error::TokenInvalid("validation returned an empty login".into()));
        }
        account.username = identity.username;
        account.user_id = identity.user_id;
        debug!(
            "(AccountAuthenticator) {} validated as {} scopes={:?} expires_in={}s",
            role, account.username, identity.scopes, identity.expires_in
        );

        let profile = self
            .exchange
            .fetch_profile(&account.user_id, &account.access_token)
            .await
            .map_err(|e| e.at_stage(AuthStage::Profile))?;
        account.display_name = profile.display_name;
        if !account.has_identity() {
            return Err(Error::ProfileLookupFailed("empty display name".into()));
        }

        account.is_connected = true;
        info!(
            "(AccountAuthenticator) {} connected as {} ({})",
            role, account.display_name, account.user_id
        );
        Ok(())
    }

    /// Checks a logged-in account's access token again. An expired token is
    /// refreshed and persisted; returns `true` when that happened.
    ///
    /// A revoked grant comes back as `ExchangeRejected` (the refresh was refused)
    /// or `TokenInvalid` (even the fresh token fails validation).
    pub async fn revalidate(&self, account: &mut Account) -> Result<bool, Error> {
        match self.exchange.validate(&account.access_token).await {
            Ok(identity) => {
                debug!(
                    "(AccountAuthenticator) {} token still valid, expires_in={}s",
                    account.role, identity.expires_in
                );
                Ok(false)
            }
            Err(Error::TokenInvalid(reason)) => {
                info!("(AccountAuthenticator) {} token no longer valid ({}), refreshing", account.role, reason);
                let refresh_token = account.refresh_token.clone();
                let tokens = self.refresh_or_forget(account, &refresh_token).await?;
                self.persist(account, tokens).await;
                self.exchange.validate(&account.access_token).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_or_forget(&self, account: &mut Account, refresh_token: &str) -> Result<TokenPair, Error> {
        match self.exchange.refresh(refresh_token).await {
            Ok(pair) => Ok(pair),
            Err(e) => {
                if matches!(e, Error::ExchangeRejected(_)) {
                    self.forget_tokens(account).await;
                }
                Err(e.at_stage(AuthStage::Exchange))
            }
        }
    }

    async fn request_code(&self, account: &Account) -> Result<String, Error> {
        let prompt = authorization_prompt(&self.config, account.role);
        let code = self
            .code_provider
            .request_authorization_code(prompt)
            .await
            .map_err(|e| e.at_stage(AuthStage::AuthorizationCode))?;
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(Error::AuthorizationCode(format!("no code entered for {}", account.role)));
        }
        Ok(code)
    }

    /// Best effort; a failed save is retried with the next successful exchange.
    async fn persist(&self, account: &mut Account, tokens: TokenPair) {
        account.apply_tokens(tokens.clone());
        if let Err(e) = self.write_tokens(account, tokens.into()).await {
            warn!("(AccountAuthenticator) could not persist tokens for {} => {}", account.role, e);
        }
    }

    /// Drops the stored pair for `account.role` so the next attempt logs in interactively.
    async fn forget_tokens(&self, account: &mut Account) {
        account.apply_tokens(TokenPair {
            access_token: String::new(),
            refresh_token: String::new(),
        });
        match self.write_tokens(account, StoredTokens::default()).await {
            Ok(()) => info!("(AccountAuthenticator) cleared rejected tokens for {}", account.role),
            Err(e) => warn!("(AccountAuthenticator) could not clear tokens for {} => {}", account.role, e),
        }
    }

    async fn write_tokens(&self, account: &Account, tokens: StoredTokens) -> Result<(), Error> {
        let mut record = self.store.load().await?;
        record.set(account.role, tokens);
        self.store.save(&record).await
    }
}
