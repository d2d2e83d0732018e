// tests/chatbot_tests.rs
mod test_utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use streamplus_core::auth::AccountAuthenticator;
use streamplus_core::eventbus::{BotEvent, EventBus};
use streamplus_core::models::{
    AccountRole, ChatbotStatus, CredentialRecord, MessageChannel, TokenIdentity, UserProfile,
};
use streamplus_core::traits::AuthorizationCodeProvider;
use streamplus_core::{AuthStage, BotConfig, Chatbot, Error};
use test_utils::*;

const CHAT_LINE: &str = "@badge-info=;badges=broadcaster/1;color=#FF4500;display-name=ImTheRayze;emotes=;flags=;id=0893b61e-3f3a-4f3b-a1d4-8e0c4a5d7f10;mod=0;room-id=1;subscriber=0;tmi-sent-ts=1600000000000;turbo=0;user-id=1;user-type= :imtherayze!imtherayze@imtherayze.tmi.twitch.tv PRIVMSG #imtherayze :Hey was geht ab";

fn status_changes(rx: &mut mpsc::Receiver<BotEvent>) -> Vec<ChatbotStatus> {
    let mut seen = vec![];
    while let Ok(event) = rx.try_recv() {
        if let BotEvent::StatusChanged(s) = event {
            seen.push(s);
        }
    }
    seen
}

async fn wait_for_event<F>(rx: &mut mpsc::Receiver<BotEvent>, mut pred: F) -> BotEvent
where
    F: FnMut(&BotEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

struct Harness {
    bot: Arc<Chatbot>,
    connector: Arc<DuplexConnector>,
    server: Option<FakeServer>,
    events: mpsc::Receiver<BotEvent>,
    store: Arc<MemoryStore>,
}

async fn harness(exchange: MockExchange) -> Harness {
    harness_with(exchange, test_config(), seeded_record(), Arc::new(FixedCode::new("code"))).await
}

async fn harness_with(
    exchange: MockExchange,
    config: Arc<BotConfig>,
    record: CredentialRecord,
    codes: Arc<dyn AuthorizationCodeProvider>,
) -> Harness {
    let (connector, server) = DuplexConnector::new();
    let store = Arc::new(MemoryStore::with(record));
    let bus = EventBus::new();
    let events = bus.subscribe(Some(64)).await;
    let auth = AccountAuthenticator::new(config.clone(), store.clone(), Arc::new(exchange), codes);
    let bot = Arc::new(Chatbot::new(config, auth, connector.clone(), bus));
    Harness {
        bot,
        connector,
        server: Some(server),
        events,
        store,
    }
}

async fn expect_handshake(server: &mut FakeServer) {
    assert_eq!(server.next_line().await, "PASS oauth:bot-access");
    assert_eq!(server.next_line().await, "NICK rayzebot");
    assert_eq!(server.next_line().await, "JOIN #imtherayze");
    assert_eq!(server.next_line().await, "CAP REQ :twitch.tv/tags");
    assert_eq!(server.next_line().await, "CAP REQ :twitch.tv/commands");
    assert_eq!(server.next_line().await, "PRIVMSG #imtherayze :/me connected [Rust]");
}

#[tokio::test]
async fn test_disconnect_when_stopped_is_rejected() {
    let mut h = harness(happy_exchange()).await;

    let err = h.bot.disconnect().await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: ChatbotStatus::Stopped,
            to: ChatbotStatus::Shutdown
        }
    ));
    assert_eq!(h.bot.status(), ChatbotStatus::Stopped);
    assert_eq!(h.connector.call_count(), 0);
    assert!(status_changes(&mut h.events).is_empty());
}

#[tokio::test]
async fn test_full_session_lifecycle() {
    let mut h = harness(happy_exchange()).await;
    let mut server = h.server.take().unwrap();

    h.bot.connect().await.expect("connect should succeed");
    assert_eq!(h.bot.status(), ChatbotStatus::Running);
    assert_eq!(h.connector.call_count(), 1);

    let (bot_account, streamer) = h.bot.accounts().await;
    assert!(bot_account.is_connected);
    assert!(streamer.is_connected);
    assert_eq!(streamer.display_name, "ImTheRayze");

    expect_handshake(&mut server).await;

    server.send(CHAT_LINE).await;
    let event = wait_for_event(&mut h.events, |e| matches!(e, BotEvent::ChatMessage { .. })).await;
    let BotEvent::ChatMessage { message, .. } = event else { unreachable!() };
    assert_eq!(message.channel, MessageChannel::Public);
    assert_eq!(message.author, "ImTheRayze");
    assert_eq!(message.body, "Hey was geht ab");
    assert!(message.is_broadcaster);

    server.send("PING :tmi.twitch.tv").await;
    assert_eq!(server.next_line().await, "PONG :tmi.twitch.tv");

    h.bot.send_message("hello chat").await.unwrap();
    assert_eq!(server.next_line().await, "PRIVMSG #imtherayze :hello chat");

    h.bot.disconnect().await.expect("disconnect should succeed");
    assert_eq!(server.next_line().await, "PRIVMSG #imtherayze :/me disconnected [Rust]");
    assert_eq!(server.next_line().await, "PART #imtherayze");
    assert_eq!(h.bot.status(), ChatbotStatus::Stopped);

    assert_eq!(
        status_changes(&mut h.events),
        vec![ChatbotStatus::Shutdown, ChatbotStatus::Stopped]
    );
    // refreshed tokens were written back for both roles
    let saved = h.store.snapshot();
    assert_eq!(saved.chatbot, stored("bot-access", "bot-refresh-2"));
    assert_eq!(saved.streamer, stored("streamer-access", "streamer-refresh-2"));
}

#[tokio::test]
async fn test_status_sequence_is_published_in_order() {
    let mut h = harness(happy_exchange()).await;
    let _server = h.server.take().unwrap();

    h.bot.connect().await.unwrap();
    h.bot.disconnect().await.unwrap();

    assert_eq!(
        status_changes(&mut h.events),
        vec![
            ChatbotStatus::Startup,
            ChatbotStatus::Running,
            ChatbotStatus::Shutdown,
            ChatbotStatus::Stopped,
        ]
    );
}

#[tokio::test]
async fn test_connect_while_running_is_rejected() {
    let mut h = harness(happy_exchange()).await;
    let _server = h.server.take().unwrap();

    h.bot.connect().await.unwrap();
    let err = h.bot.connect().await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: ChatbotStatus::Running,
            to: ChatbotStatus::Startup
        }
    ));
    assert_eq!(h.bot.status(), ChatbotStatus::Running);
    assert_eq!(h.connector.call_count(), 1);
}

#[tokio::test]
async fn test_server_close_stops_session() {
    let mut h = harness(happy_exchange()).await;
    let mut server = h.server.take().unwrap();
    let mut status = h.bot.subscribe_status();

    h.bot.connect().await.unwrap();
    expect_handshake(&mut server).await;
    drop(server);

    timeout(Duration::from_secs(2), status.wait_for(|s| *s == ChatbotStatus::Stopped))
        .await
        .expect("status should drop to Stopped")
        .unwrap();
    wait_for_event(&mut h.events, |e| matches!(e, BotEvent::ConnectionLost { .. })).await;

    assert!(matches!(
        h.bot.disconnect().await,
        Err(Error::InvalidTransition { .. })
    ));
    assert!(h.bot.send_message("anyone?").await.is_err());
}

#[tokio::test]
async fn test_reconnect_after_loss_reports_connection_failure() {
    let mut h = harness(happy_exchange()).await;
    let server = h.server.take().unwrap();
    let mut status = h.bot.subscribe_status();

    h.bot.connect().await.unwrap();
    drop(server);
    timeout(Duration::from_secs(2), status.wait_for(|s| *s == ChatbotStatus::Stopped))
        .await
        .unwrap()
        .unwrap();

    // the fake only serves one connection
    let err = h.bot.connect().await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert_eq!(h.bot.status(), ChatbotStatus::Stopped);
    assert_eq!(h.connector.call_count(), 2);

    let failed = wait_for_event(&mut h.events, |e| matches!(e, BotEvent::ConnectFailed { .. })).await;
    assert!(matches!(failed, BotEvent::ConnectFailed { role: None, stage: None, .. }));
}

#[tokio::test]
async fn test_bot_login_failure_skips_streamer_and_socket() {
    let mut exchange = MockExchange::new();
    exchange
        .expect_refresh()
        .withf(|token| token.starts_with("bot"))
        .times(1)
        .returning(|_| Err(Error::ExchangeRejected("HTTP 400".into())));
    exchange.expect_validate().never();
    exchange.expect_fetch_profile().never();

    let mut h = harness(exchange).await;
    let err = h.bot.connect().await.unwrap_err();

    assert!(matches!(err, Error::ExchangeRejected(_)));
    assert_eq!(h.bot.status(), ChatbotStatus::Stopped);
    assert_eq!(h.connector.call_count(), 0);
    assert_eq!(
        status_changes(&mut h.events),
        vec![ChatbotStatus::Startup, ChatbotStatus::Stopped]
    );

    let (_, streamer) = h.bot.accounts().await;
    assert!(!streamer.is_connected);
}

#[tokio::test]
async fn test_streamer_validation_failure_is_reported_with_role() {
    let mut exchange = MockExchange::new();
    exchange.expect_refresh().returning(|refresh| {
        if refresh.starts_with("bot") {
            Ok(pair("bot-access", "bot-refresh-2"))
        } else {
            Ok(pair("streamer-access", "streamer-refresh-2"))
        }
    });
    exchange.expect_validate().returning(|token| {
        if token.starts_with("bot") {
            Ok(TokenIdentity {
                username: "rayzebot".into(),
                user_id: "2".into(),
                scopes: vec![],
                expires_in: 100,
            })
        } else {
            Err(Error::TokenInvalid("401".into()))
        }
    });
    exchange.expect_fetch_profile().returning(|_, _| {
        Ok(UserProfile {
            display_name: "RayzeBot".into(),
        })
    });

    let mut h = harness(exchange).await;
    assert!(h.bot.connect().await.is_err());
    assert_eq!(h.connector.call_count(), 0);

    let failed = wait_for_event(&mut h.events, |e| matches!(e, BotEvent::ConnectFailed { .. })).await;
    let BotEvent::ConnectFailed { role, stage, .. } = failed else { unreachable!() };
    assert_eq!(role, Some(AccountRole::Streamer));
    assert_eq!(stage, Some(AuthStage::Validation));

    let (bot_account, streamer) = h.bot.accounts().await;
    assert!(bot_account.is_connected);
    assert!(!streamer.is_connected);
    assert!(h.store.snapshot().streamer.is_empty());
}

#[tokio::test]
async fn test_connect_runs_on_a_spawned_task() {
    let mut h = harness(happy_exchange()).await;
    let mut server = h.server.take().unwrap();

    let bot = Arc::clone(&h.bot);
    let connecting = tokio::spawn(async move { bot.connect().await });
    connecting.await.unwrap().expect("connect should succeed");

    assert_eq!(h.bot.status(), ChatbotStatus::Running);
    expect_handshake(&mut server).await;
    h.bot.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_accounts_readable_while_login_waits_for_code() {
    let codes = Arc::new(PendingCode::default());
    let h = harness_with(
        happy_exchange(),
        test_config(),
        CredentialRecord::default(),
        codes.clone(),
    )
    .await;

    let bot = Arc::clone(&h.bot);
    let connecting = tokio::spawn(async move { bot.connect().await });
    timeout(Duration::from_secs(2), codes.asked.notified())
        .await
        .expect("login should ask for a code");
    assert_eq!(h.bot.status(), ChatbotStatus::Startup);

    let (bot_account, streamer) = timeout(Duration::from_secs(1), h.bot.accounts())
        .await
        .expect("accounts() blocked behind the login");
    assert!(!bot_account.is_connected);
    assert!(!streamer.is_connected);

    connecting.abort();
}

/// The bot's first access token expires after one successful check;
/// `renewed` decides what refreshing it yields.
fn expiring_bot_token(renewed: Result<(&'static str, &'static str), &'static str>) -> MockExchange {
    let mut exchange = MockExchange::new();
    exchange.expect_refresh().returning(move |refresh| match refresh {
        "bot-refresh" => Ok(pair("bot-access", "bot-refresh-2")),
        "bot-refresh-2" => match renewed {
            Ok((access, refresh)) => Ok(pair(access, refresh)),
            Err(reason) => Err(Error::ExchangeRejected(reason.into())),
        },
        _ => Ok(pair("streamer-access", "streamer-refresh-2")),
    });
    let checks = Arc::new(AtomicUsize::new(0));
    exchange.expect_validate().returning(move |token| {
        if token == "bot-access" && checks.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(Error::TokenInvalid("HTTP 401".into()));
        }
        let (username, user_id) = if token.starts_with("bot") {
            ("rayzebot", "2")
        } else {
            ("imtherayze", "1")
        };
        Ok(TokenIdentity {
            username: username.into(),
            user_id: user_id.into(),
            scopes: vec![],
            expires_in: 100,
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

#[tokio::test]
async fn test_watchdog_renews_expired_token() {
    let mut h = harness_with(
        expiring_bot_token(Ok(("bot-access-2", "bot-refresh-3"))),
        test_config_revalidating(1),
        seeded_record(),
        Arc::new(FixedCode::new("code")),
    )
    .await;
    let _server = h.server.take().unwrap();

    h.bot.connect().await.unwrap();
    timeout(Duration::from_secs(4), async {
        loop {
            let (bot_account, _) = h.bot.accounts().await;
            if bot_account.access_token == "bot-access-2" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("bot token was not renewed");

    assert_eq!(h.bot.status(), ChatbotStatus::Running);
    assert_eq!(h.store.snapshot().chatbot, stored("bot-access-2", "bot-refresh-3"));
    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(event, BotEvent::TokenRevoked { .. }), "unexpected {:?}", event);
    }
}

#[tokio::test]
async fn test_watchdog_reports_revoked_grant_once() {
    let mut h = harness_with(
        expiring_bot_token(Err("HTTP 400")),
        test_config_revalidating(1),
        seeded_record(),
        Arc::new(FixedCode::new("code")),
    )
    .await;
    let _server = h.server.take().unwrap();

    h.bot.connect().await.unwrap();
    let revoked = timeout(Duration::from_secs(4), async {
        loop {
            match h.events.recv().await.expect("event bus closed") {
                BotEvent::TokenRevoked { role } => return role,
                _ => continue,
            }
        }
    })
    .await
    .expect("revocation was not reported");
    assert_eq!(revoked, AccountRole::Chatbot);
    assert!(h.store.snapshot().chatbot.is_empty());

    // one more tick passes without a second report
    tokio::time::sleep(Duration::from_millis(1500)).await;
    while let Ok(event) = h.events.try_recv() {
        assert!(!matches!(event, BotEvent::TokenRevoked { .. }), "reported twice: {:?}", event);
    }
}
