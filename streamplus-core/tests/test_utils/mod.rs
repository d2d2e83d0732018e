// tests/test_utils/mod.rs
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mockall::mock;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf, split};

use streamplus_core::auth::AccountAuthenticator;
use streamplus_core::models::{
    AuthorizationPrompt, CredentialRecord, StoredTokens, TokenIdentity, TokenPair, UserProfile,
};
use streamplus_core::platforms::twitch_irc::{BoxedChatStream, ChatConnector};
use streamplus_core::traits::{AuthorizationCodeProvider, CredentialStore, TokenExchange};
use streamplus_core::{BotConfig, Error};

mock! {
    pub Exchange {}

    #[async_trait]
    impl TokenExchange for Exchange {
        async fn exchange_authorization_code(&self, code: &str) -> Result<TokenPair, Error>;
        async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error>;
        async fn validate(&self, access_token: &str) -> Result<TokenIdentity, Error>;
        async fn fetch_profile(&self, user_id: &str, access_token: &str) -> Result<UserProfile, Error>;
    }
}

pub fn pair(access: &str, refresh: &str) -> TokenPair {
    TokenPair {
        access_token: access.into(),
        refresh_token: refresh.into(),
    }
}

pub fn stored(access: &str, refresh: &str) -> StoredTokens {
    pair(access, refresh).into()
}

/// Both roles already logged in once.
pub fn seeded_record() -> CredentialRecord {
    CredentialRecord {
        streamer: stored("streamer-old", "streamer-refresh"),
        chatbot: stored("bot-old", "bot-refresh"),
    }
}

/// Refresh, validation and profile lookup all succeed for both accounts.
/// Bot tokens start with "bot", streamer tokens with "streamer".
pub fn happy_exchange() -> MockExchange {
    let mut exchange = MockExchange::new();
    exchange.expect_refresh().returning(|refresh| {
        if refresh.starts_with("bot") {
            Ok(pair("bot-access", "bot-refresh-2"))
        } else {
            Ok(pair("streamer-access", "streamer-refresh-2"))
        }
    });
    exchange.expect_validate().returning(|token| {
        let (username, user_id) = if token.starts_with("bot") {
            ("rayzebot", "2")
        } else {
            ("imtherayze", "1")
        };
        Ok(TokenIdentity {
            username: username.into(),
            user_id: user_id.into(),
            scopes: vec!["chat:read".into()],
            expires_in: 14_000,
        })
    });
    exchange.expect_fetch_profile().returning(|user_id, _| {
        let display_name = if user_id == "1" { "ImTheRayze" } else { "RayzeBot" };
        Ok(UserProfile {
            display_name: display_name.into(),
        })
    });
    exchange
}

#[derive(Default)]
pub struct MemoryStore {
    pub record: Mutex<CredentialRecord>,
    pub fail_saves: bool,
    pub saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(record),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> CredentialRecord {
        self.record.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<CredentialRecord, Error> {
        Ok(self.record.lock().unwrap().clone())
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), Error> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(Error::StoreUnwritable("read-only test store".into()));
        }
        *self.record.lock().unwrap() = record.clone();
        Ok(())
    }
}

/// Hands out a fixed code and remembers every prompt it was shown.
#[derive(Default)]
pub struct FixedCode {
    pub code: String,
    pub prompts: Mutex<Vec<AuthorizationPrompt>>,
}

impl FixedCode {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.into(),
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl AuthorizationCodeProvider for FixedCode {
    async fn request_authorization_code(&self, prompt: AuthorizationPrompt) -> Result<String, Error> {
        self.prompts.lock().unwrap().push(prompt);
        Ok(self.code.clone())
    }
}

/// Never answers, like a user who walked away from the browser.
#[derive(Default)]
pub struct PendingCode {
    pub asked: tokio::sync::Notify,
}

#[async_trait]
impl AuthorizationCodeProvider for PendingCode {
    async fn request_authorization_code(&self, _prompt: AuthorizationPrompt) -> Result<String, Error> {
        self.asked.notify_one();
        std::future::pending().await
    }
}

/// In-memory chat server: `connect()` hands out the client end of a duplex pipe.
pub struct DuplexConnector {
    client_end: Mutex<Option<DuplexStream>>,
    pub calls: AtomicUsize,
}

pub struct FakeServer {
    pub lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    pub writer: WriteHalf<DuplexStream>,
}

impl FakeServer {
    pub async fn next_line(&mut self) -> String {
        let next = tokio::time::timeout(std::time::Duration::from_secs(2), self.lines.next_line())
            .await
            .expect("server waited too long for a line")
            .expect("read from client failed");
        next.expect("client closed the connection")
    }

    pub async fn send(&mut self, line: &str) {
        use tokio::io::AsyncWriteExt;
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, FakeServer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (read, writer) = split(server);
        (
            Arc::new(Self {
                client_end: Mutex::new(Some(client)),
                calls: AtomicUsize::new(0),
            }),
            FakeServer {
                lines: BufReader::new(read).lines(),
                writer,
            },
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatConnector for DuplexConnector {
    async fn connect(&self) -> Result<BoxedChatStream, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.client_end.lock().unwrap().take() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(Error::Protocol("test server already used".into())),
        }
    }
}

pub fn test_config() -> Arc<BotConfig> {
    test_config_revalidating(0)
}

pub fn test_config_revalidating(every_secs: u64) -> Arc<BotConfig> {
    let mut config = BotConfig::default();
    config.revalidate_interval_secs = every_secs;
    config.greeting = "/me connected [Rust]".into();
    config.farewell = "/me disconnected [Rust]".into();
    Arc::new(config)
}

pub fn authenticator(
    config: Arc<BotConfig>,
    store: Arc<MemoryStore>,
    exchange: MockExchange,
    codes: Arc<FixedCode>,
) -> AccountAuthenticator {
    AccountAuthenticator::new(config, store, Arc::new(exchange), codes)
}
