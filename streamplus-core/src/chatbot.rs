//! src/chatbot.rs
//!
//! Session controller. Owns the two accounts and the status state machine,
//! logs both accounts in, then hands the connection to the IRC read loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::auth::{AccountAuthenticator, TwitchTokenClient};
use crate::config::BotConfig;
use crate::credentials::JsonCredentialStore;
use crate::eventbus::{BotEvent, EventBus};
use crate::models::{Account, AccountRole, ChatbotStatus};
use crate::platforms::twitch_irc::{ChatConnector, ReadLoop, TcpChatConnector, TwitchIrcClient};
use crate::traits::AuthorizationCodeProvider;

/// How long `disconnect()` waits for the read loop to notice the close.
const READ_LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Current status plus the bus its changes are announced on.
struct StatusCell {
    tx: watch::Sender<ChatbotStatus>,
    events: EventBus,
}

impl StatusCell {
    fn current(&self) -> ChatbotStatus {
        *self.tx.borrow()
    }

    /// Moves to `to` if the state machine allows it from wherever we are now.
    async fn transition(&self, to: ChatbotStatus) -> Result<ChatbotStatus, Error> {
        let mut from = ChatbotStatus::Stopped;
        let mut allowed = false;
        self.tx.send_if_modified(|current| {
            from = *current;
            allowed = current.can_transition_to(to);
            if allowed {
                *current = to;
            }
            allowed
        });
        if !allowed {
            return Err(Error::InvalidTransition { from, to });
        }
        info!("(Chatbot) status {} -> {}", from, to);
        self.events.publish(BotEvent::StatusChanged(to)).await;
        Ok(from)
    }

    /// Compare-and-set: only moves if the current status is `expected`.
    async fn transition_from(&self, expected: ChatbotStatus, to: ChatbotStatus) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == expected && expected.can_transition_to(to) {
                *current = to;
                true
            } else {
                false
            }
        });
        if changed {
            info!("(Chatbot) status {} -> {}", expected, to);
            self.events.publish(BotEvent::StatusChanged(to)).await;
        }
        changed
    }
}

struct SessionAccounts {
    bot: Account,
    streamer: Account,
}

impl SessionAccounts {
    fn get(&self, role: AccountRole) -> &Account {
        match role {
            AccountRole::Chatbot => &self.bot,
            AccountRole::Streamer => &self.streamer,
        }
    }

    fn set(&mut self, account: Account) {
        match account.role {
            AccountRole::Chatbot => self.bot = account,
            AccountRole::Streamer => self.streamer = account,
        }
    }
}

struct ActiveSession {
    client: TwitchIrcClient,
    cancel: CancellationToken,
    read_task: JoinHandle<()>,
    watchdog: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn abort(self) {
        self.cancel.cancel();
        self.read_task.abort();
        if let Some(w) = self.watchdog {
            w.abort();
        }
    }
}

pub struct Chatbot {
    config: Arc<BotConfig>,
    authenticator: Arc<AccountAuthenticator>,
    connector: Arc<dyn ChatConnector>,
    status: Arc<StatusCell>,
    accounts: Arc<Mutex<SessionAccounts>>,
    session: Mutex<Option<ActiveSession>>,
}

impl Chatbot {
    pub fn new(
        config: Arc<BotConfig>,
        authenticator: AccountAuthenticator,
        connector: Arc<dyn ChatConnector>,
        events: EventBus,
    ) -> Self {
        let (tx, _rx) = watch::channel(ChatbotStatus::Stopped);
        Self {
            config,
            authenticator: Arc::new(authenticator),
            connector,
            status: Arc::new(StatusCell { tx, events }),
            accounts: Arc::new(Mutex::new(SessionAccounts {
                bot: Account::new(AccountRole::Chatbot),
                streamer: Account::new(AccountRole::Streamer),
            })),
            session: Mutex::new(None),
        }
    }

    /// Production wiring: JSON credential file, reqwest token client, TCP/TLS chat connection.
    pub async fn from_config(
        config: BotConfig,
        code_provider: Arc<dyn AuthorizationCodeProvider>,
        events: EventBus,
    ) -> Result<Self, Error> {
        let config = Arc::new(config);
        let store = JsonCredentialStore::open_or_init(config.credentials_path()?).await?;
        let exchange = TwitchTokenClient::new(&config)?;
        let authenticator = AccountAuthenticator::new(
            Arc::clone(&config),
            Arc::new(store),
            Arc::new(exchange),
            code_provider,
        );
        let connector = TcpChatConnector::new(config.chat.clone());
        Ok(Self::new(config, authenticator, Arc::new(connector), events))
    }

    pub fn status(&self) -> ChatbotStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChatbotStatus> {
        self.status.tx.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.status.events
    }

    /// Snapshot of (bot, streamer). Never waits on a login in progress.
    pub async fn accounts(&self) -> (Account, Account) {
        let accounts = self.accounts.lock().await;
        (accounts.bot.clone(), accounts.streamer.clone())
    }

    /// Logs one account in on a private copy; the shared record is only
    /// locked to take the copy and to store the result.
    async fn login(&self, role: AccountRole) -> Result<Account, Error> {
        let mut account = self.accounts.lock().await.get(role).clone();
        let result = self.authenticator.authenticate(&mut account).await;
        self.accounts.lock().await.set(account.clone());
        result.map(|()| account)
    }

    /// `Stopped -> Startup -> Running`, then joins the streamer's chat.
    ///
    /// The bot account always logs in before the streamer account: the bot's
    /// interactive login leaves a browser session behind that the streamer's
    /// login reuses. If either login or the chat handshake fails the status
    /// returns to `Stopped`, a `ConnectFailed` event names the failing role and
    /// stage, and the error is returned.
    pub async fn connect(&self) -> Result<(), Error> {
        self.status.transition(ChatbotStatus::Startup).await?;

        if let Some(stale) = self.session.lock().await.take() {
            debug!("(Chatbot) discarding leftovers of a lost connection");
            stale.abort();
        }

        match self.start().await {
            Ok(()) => Ok(()),
            Err((role, e)) => {
                error!("(Chatbot) connect failed => {}", e);
                if let Err(te) = self.status.transition(ChatbotStatus::Stopped).await {
                    warn!("(Chatbot) could not return to Stopped => {}", te);
                }
                self.status
                    .events
                    .publish(BotEvent::ConnectFailed {
                        role,
                        stage: e.auth_stage(),
                        reason: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn start(&self) -> Result<(), (Option<AccountRole>, Error)> {
        let bot = self
            .login(AccountRole::Chatbot)
            .await
            .map_err(|e| (Some(AccountRole::Chatbot), e))?;
        let streamer = self
            .login(AccountRole::Streamer)
            .await
            .map_err(|e| (Some(AccountRole::Streamer), e))?;

        let mut slot = self.session.lock().await;
        self.status
            .transition(ChatbotStatus::Running)
            .await
            .map_err(|e| (None, e))?;

        let stream = self.connector.connect().await.map_err(|e| (None, e))?;
        let mut client = TwitchIrcClient::new(stream, &streamer.username);
        client
            .handshake(&bot, &self.config.greeting)
            .await
            .map_err(|e| (None, e))?;

        let cancel = CancellationToken::new();
        let read_loop = client
            .read_loop(
                &streamer.display_name,
                self.config.chat.read_timeout(),
                self.subscribe_status(),
                cancel.clone(),
                self.status.events.clone(),
            )
            .ok_or_else(|| (None, Error::Protocol("read half already taken".into())))?;
        let read_task = tokio::spawn(supervise_read_loop(
            read_loop,
            Arc::clone(&self.status),
            cancel.clone(),
        ));

        let watchdog = self.config.revalidate_interval().map(|every| {
            tokio::spawn(token_watchdog(
                Arc::clone(&self.authenticator),
                Arc::clone(&self.accounts),
                every,
                cancel.child_token(),
                self.status.events.clone(),
            ))
        });

        *slot = Some(ActiveSession {
            client,
            cancel,
            read_task,
            watchdog,
        });
        Ok(())
    }

    /// Says goodbye, leaves the channel and closes the connection:
    /// `Running -> Shutdown -> Stopped`.
    ///
    /// Fails with `InvalidTransition` from any other status, without touching
    /// the connection.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let current = self.status.current();
        if current != ChatbotStatus::Running {
            return Err(Error::InvalidTransition {
                from: current,
                to: ChatbotStatus::Shutdown,
            });
        }

        let mut slot = self.session.lock().await;
        let Some(mut session) = slot.take() else {
            return Err(Error::InvalidTransition {
                from: self.status.current(),
                to: ChatbotStatus::Shutdown,
            });
        };

        if let Err(e) = session.client.send_privmsg(&self.config.farewell).await {
            warn!("(Chatbot) farewell not sent => {}", e);
        }
        if let Err(e) = session.client.part_channel().await {
            warn!("(Chatbot) PART not sent => {}", e);
        }
        let shutting_down = self.status.transition(ChatbotStatus::Shutdown).await;

        session.cancel.cancel();
        session.client.shutdown().await;
        if timeout(READ_LOOP_JOIN_TIMEOUT, &mut session.read_task).await.is_err() {
            warn!("(Chatbot) read loop did not stop in time, aborting it");
            session.read_task.abort();
        }
        if let Some(w) = session.watchdog.take() {
            w.abort();
        }

        match shutting_down {
            Ok(_) => {
                self.status.transition(ChatbotStatus::Stopped).await?;
            }
            // the read loop lost the connection first and already stopped us
            Err(e) => debug!("(Chatbot) disconnect after connection loss => {}", e),
        }
        Ok(())
    }

    /// Sends `text` to the joined channel. Only valid while `Running`.
    pub async fn send_message(&self, text: &str) -> Result<(), Error> {
        let current = self.status.current();
        if current != ChatbotStatus::Running {
            return Err(Error::Protocol(format!("cannot send chat while {current}")));
        }
        let slot = self.session.lock().await;
        let session = slot
            .as_ref()
            .ok_or_else(|| Error::Protocol("no active chat connection".into()))?;
        session.client.send_privmsg(text).await?;
        info!("(Chatbot) #automated# {}", text);
        Ok(())
    }
}

async fn supervise_read_loop(read_loop: ReadLoop, status: Arc<StatusCell>, cancel: CancellationToken) {
    if let Err(e) = read_loop.run().await {
        error!("(Chatbot) chat connection lost => {}", e);
        if status
            .transition_from(ChatbotStatus::Running, ChatbotStatus::Stopped)
            .await
        {
            status
                .events
                .publish(BotEvent::ConnectionLost { reason: e.to_string() })
                .await;
        }
    }
    cancel.cancel();
}

/// Re-validates both accounts every `every` until cancelled. Expired tokens
/// are refreshed in place; a revoked grant is reported once per account.
async fn token_watchdog(
    authenticator: Arc<AccountAuthenticator>,
    accounts: Arc<Mutex<SessionAccounts>>,
    every: Duration,
    cancel: CancellationToken,
    events: EventBus,
) {
    let mut ticker = tokio::time::interval(every);
    // first tick is immediate; the tokens were validated moments ago
    ticker.tick().await;
    let mut revoked: Vec<AccountRole> = Vec::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        for role in [AccountRole::Chatbot, AccountRole::Streamer] {
            if revoked.contains(&role) {
                continue;
            }
            let mut account = accounts.lock().await.get(role).clone();
            match authenticator.revalidate(&mut account).await {
                Ok(false) => {}
                Ok(true) => {
                    info!("(Chatbot) {} token renewed", role);
                    accounts.lock().await.set(account);
                }
                Err(e) if matches!(e, Error::ExchangeRejected(_) | Error::TokenInvalid(_)) => {
                    warn!("(Chatbot) {} token revoked => {}", role, e);
                    revoked.push(role);
                    events.publish(BotEvent::TokenRevoked { role }).await;
                }
                Err(e) => warn!("(Chatbot) revalidation of {} failed => {}", role, e),
            }
        }
    }
}
