use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use streamplus_core::eventbus::{BotEvent, EventBus};
use streamplus_core::{BotConfig, Chatbot};

mod console;
use console::ConsolePrompt;

#[derive(Parser, Debug, Clone)]
#[command(name = "streamplus")]
#[command(author, version, about = "StreamPlus - Twitch chatbot core")]
struct Args {
    /// JSON config file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Credential file, overriding the config and STREAMPLUS_CREDENTIALS_PATH.
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Print the authorization URL instead of opening a browser.
    #[arg(long, default_value = "false")]
    no_browser: bool,

    /// Connect right away instead of waiting for the `connect` command.
    #[arg(long, default_value = "false")]
    connect: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("streamplus=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let mut config = BotConfig::load(args.config.as_deref())?;
    if let Some(path) = args.credentials {
        config.credentials_path = Some(path);
    }
    info!(
        "StreamPlus starting. chat={}:{} tls={}",
        config.chat.host, config.chat.port, config.chat.tls
    );

    let prompt = Arc::new(ConsolePrompt::new(!args.no_browser));
    let events = EventBus::new();
    let event_rx = events.subscribe(None).await;
    let bot = Arc::new(Chatbot::from_config(config, prompt.clone(), events).await?);

    tokio::spawn(print_events(event_rx));

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);
    spawn_stdin_thread(Arc::clone(&prompt), cmd_tx);

    print_help();
    if args.connect {
        spawn_connect(Arc::clone(&bot));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Ctrl-C received.");
                break;
            }
            line = cmd_rx.recv() => {
                let Some(line) = line else { break };
                if !run_command(&bot, line.trim()).await {
                    break;
                }
            }
        }
    }

    if bot.status() == streamplus_core::models::ChatbotStatus::Running {
        if let Err(e) = bot.disconnect().await {
            warn!("disconnect on exit failed => {}", e);
        }
    }
    info!("StreamPlus stopped.");
    Ok(())
}

/// Returns false when the user asked to quit.
async fn run_command(bot: &Arc<Chatbot>, line: &str) -> bool {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match cmd {
        "" => {}
        "help" => print_help(),
        "connect" => spawn_connect(Arc::clone(bot)),
        "disconnect" => {
            if let Err(e) = bot.disconnect().await {
                println!("Cannot disconnect: {e}");
            }
        }
        "status" => {
            let (chatbot, streamer) = bot.accounts().await;
            println!("Status: {}", bot.status());
            println!("  bot      => {:?}", chatbot);
            println!("  streamer => {:?}", streamer);
        }
        "say" => {
            if rest.is_empty() {
                println!("Usage: say <message>");
            } else if let Err(e) = bot.send_message(rest).await {
                println!("Cannot send: {e}");
            }
        }
        "quit" | "exit" => return false,
        other => println!("Unknown command '{other}'. Type 'help'."),
    }
    true
}

fn spawn_connect(bot: Arc<Chatbot>) {
    tokio::spawn(async move {
        if let Err(e) = bot.connect().await {
            error!("connect failed => {}", e);
        }
    });
}

/// Reads stdin on a plain thread; a pending code request gets first pick of each line.
fn spawn_stdin_thread(prompt: Arc<ConsolePrompt>, commands: mpsc::Sender<String>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if let Some(cmd) = prompt.route(line) {
                if commands.blocking_send(cmd).is_err() {
                    break;
                }
            }
        }
    });
}

async fn print_events(mut rx: mpsc::Receiver<BotEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BotEvent::StatusChanged(status) => println!("[status] {} ({})", status, status.action_label()),
            BotEvent::ConnectFailed { role, stage, reason } => {
                let who = role.map(|r| r.to_string()).unwrap_or_else(|| "chat".into());
                let at = stage.map(|s| s.to_string()).unwrap_or_else(|| "connection".into());
                println!("[error] {who} failed at {at}: {reason}");
            }
            BotEvent::ConnectionLost { reason } => println!("[error] chat connection lost: {reason}"),
            BotEvent::TokenRevoked { role } => {
                println!("[warn] {role} token was revoked and could not be refreshed; disconnect and connect again to log in")
            }
            BotEvent::ChatMessage { message, received_at } => {
                println!("[{}] {}: {}", received_at.format("%H:%M:%S"), message.author, message.body)
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  connect     - log both accounts in and join the streamer's chat");
    println!("  disconnect  - say goodbye and leave the chat");
    println!("  status      - show status and accounts");
    println!("  say <text>  - send a chat message as the bot");
    println!("  quit        - disconnect and exit");
}
