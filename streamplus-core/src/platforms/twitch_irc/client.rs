//! src/platforms/twitch_irc/client.rs
//!
//! Connection to the Twitch chat server: transport setup, the login
//! handshake, outbound lines and the blocking read loop.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
    split,
};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_native_tls::{TlsConnector, native_tls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::ChatServerConfig;
use crate::eventbus::EventBus;
use crate::models::{Account, ChatbotStatus};

use super::message::{InboundLine, PONG_LINE, ParseContext, classify_line};

/// Longest inbound line kept; Twitch lines with full tags stay well below this.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

pub trait ChatStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ChatStream for T {}

pub type BoxedChatStream = Box<dyn ChatStream>;

/// Opens the byte stream to the chat server.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self) -> Result<BoxedChatStream, Error>;
}

/// Plain TCP (or TLS when `tls` is set) to the configured host.
pub struct TcpChatConnector {
    config: ChatServerConfig,
}

impl TcpChatConnector {
    pub fn new(config: ChatServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChatConnector for TcpChatConnector {
    async fn connect(&self) -> Result<BoxedChatStream, Error> {
        let host = self.config.host.as_str();
        let deadline = self.config.connect_timeout();

        let tcp = timeout(deadline, TcpStream::connect((host, self.config.port)))
            .await
            .map_err(|_| Error::Protocol(format!("TCP connect to {host}:{} timed out", self.config.port)))?
            .map_err(|e| Error::Protocol(format!("TCP connect error: {e}")))?;

        if !self.config.tls {
            info!("(TcpChatConnector) connected to {}:{}", host, self.config.port);
            return Ok(Box::new(tcp));
        }

        let native_connector = native_tls::TlsConnector::new()
            .map_err(|e| Error::Protocol(format!("TLSConnector::new() => {e}")))?;
        let connector = TlsConnector::from(native_connector);
        let tls_stream = timeout(deadline, connector.connect(host, tcp))
            .await
            .map_err(|_| Error::Protocol(format!("TLS handshake with {host} timed out")))?
            .map_err(|e| Error::Protocol(format!("TLS connect() => {e}")))?;

        info!("(TcpChatConnector) connected to {}:{} (TLS)", host, self.config.port);
        Ok(Box::new(tls_stream))
    }
}

pub type ChatReader = BufReader<ReadHalf<BoxedChatStream>>;

/// Write half. Every line is terminated and flushed on its own.
pub struct ChatWriter {
    inner: BufWriter<WriteHalf<BoxedChatStream>>,
}

impl ChatWriter {
    /// Writes one protocol line. A line carrying its own CR or LF is refused
    /// before anything reaches the socket.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        if line.contains(['\r', '\n']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "line contains CR or LF",
            ));
        }
        if line.starts_with("PASS ") {
            debug!(">> PASS oauth:***");
        } else {
            debug!(">> {}", line);
        }
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\r\n").await?;
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

pub struct TwitchIrcClient {
    channel: String,
    writer: Arc<Mutex<ChatWriter>>,
    // the mutex keeps the client Sync; the reader itself is only ever moved out
    reader: Mutex<Option<ChatReader>>,
}

impl TwitchIrcClient {
    /// Wraps an open stream; `channel` is the login of the channel to join, without `#`.
    pub fn new(stream: BoxedChatStream, channel: &str) -> Self {
        let (read_half, write_half) = split(stream);
        Self {
            channel: channel.to_lowercase(),
            writer: Arc::new(Mutex::new(ChatWriter {
                inner: BufWriter::new(write_half),
            })),
            reader: Mutex::new(Some(BufReader::new(read_half))),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// PASS, NICK, JOIN, the two capability requests, then the greeting, in that order.
    pub async fn handshake(&self, bot: &Account, greeting: &str) -> Result<(), Error> {
        let lines = [
            format!("PASS oauth:{}", bot.access_token),
            format!("NICK {}", bot.username),
            format!("JOIN #{}", self.channel),
            "CAP REQ :twitch.tv/tags".to_string(),
            "CAP REQ :twitch.tv/commands".to_string(),
            format!("PRIVMSG #{} :{}", self.channel, greeting),
        ];
        let mut writer = self.writer.lock().await;
        for line in &lines {
            writer
                .send_line(line)
                .await
                .map_err(|e| Error::Protocol(format!("handshake write failed: {e}")))?;
        }
        info!("(TwitchIrcClient) joined #{} as {}", self.channel, bot.username);
        Ok(())
    }

    pub async fn send_raw_line(&self, line: &str) -> Result<(), Error> {
        self.writer
            .lock()
            .await
            .send_line(line)
            .await
            .map_err(|e| Error::Protocol(format!("write failed: {e}")))
    }

    pub async fn send_privmsg(&self, message: &str) -> Result<(), Error> {
        self.send_raw_line(&format!("PRIVMSG #{} :{}", self.channel, message))
            .await
    }

    pub async fn part_channel(&self) -> Result<(), Error> {
        self.send_raw_line(&format!("PART #{}", self.channel)).await
    }

    /// Closes the write half; the server answers by closing its side, which ends any pending read.
    pub async fn shutdown(&self) {
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("(TwitchIrcClient) shutdown => {}", e);
        }
    }

    /// Hands the read half to a `ReadLoop`. Returns `None` once taken.
    pub fn read_loop(
        &mut self,
        broadcaster_display_name: &str,
        read_timeout: Duration,
        status: watch::Receiver<ChatbotStatus>,
        cancel: CancellationToken,
        events: EventBus,
    ) -> Option<ReadLoop> {
        let reader = self.reader.get_mut().take()?;
        Some(ReadLoop {
            reader,
            writer: Arc::clone(&self.writer),
            ctx: ParseContext {
                channel: self.channel.clone(),
                broadcaster_display_name: broadcaster_display_name.to_string(),
            },
            read_timeout,
            status,
            cancel,
            events,
        })
    }
}

pub struct ReadLoop {
    reader: ChatReader,
    writer: Arc<Mutex<ChatWriter>>,
    ctx: ParseContext,
    read_timeout: Duration,
    status: watch::Receiver<ChatbotStatus>,
    cancel: CancellationToken,
    events: EventBus,
}

impl ReadLoop {
    /// Reads until cancelled or the session leaves `Running` (`Ok`), or until
    /// the link breaks or stays silent past the read timeout (`Err`).
    pub async fn run(mut self) -> Result<(), Error> {
        let mut line_buffer: Vec<u8> = Vec::new();

        loop {
            let running = *self.status.borrow() == ChatbotStatus::Running;
            if !running || self.cancel.is_cancelled() {
                break;
            }

            line_buffer.clear();
            let read = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = timeout(self.read_timeout, read_capped_line(&mut self.reader, &mut line_buffer)) => r,
            };

            match read {
                Err(_) => {
                    return Err(Error::Protocol(format!(
                        "no data from chat server for {}s",
                        self.read_timeout.as_secs()
                    )));
                }
                Ok(Err(e)) => {
                    if self.stopping() {
                        break;
                    }
                    return Err(Error::Protocol(format!("read error: {e}")));
                }
                Ok(Ok(LineRead::Eof)) => {
                    if self.stopping() {
                        break;
                    }
                    return Err(Error::Protocol("connection closed by server".into()));
                }
                Ok(Ok(LineRead::Oversize)) => {
                    warn!("(TwitchIrcClient) dropped line longer than {} bytes", MAX_LINE_BYTES);
                    continue;
                }
                Ok(Ok(LineRead::Line)) => {}
            }

            let text = String::from_utf8_lossy(&line_buffer);
            let line = text.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            debug!("<< {}", line);

            match classify_line(line, &self.ctx) {
                InboundLine::Ping => {
                    self.writer
                        .lock()
                        .await
                        .send_line(PONG_LINE)
                        .await
                        .map_err(|e| Error::Protocol(format!("PONG write failed: {e}")))?;
                    debug!("(TwitchIrcClient) answered keepalive");
                }
                InboundLine::Chat(message) => {
                    info!("(TwitchIrcClient) {}", message);
                    self.events.publish_chat(message).await;
                }
                InboundLine::Ignored(reason) => {
                    debug!("(TwitchIrcClient) dropped line => {}", reason);
                }
            }
        }

        info!("(TwitchIrcClient) read loop ended.");
        Ok(())
    }

    fn stopping(&self) -> bool {
        self.cancel.is_cancelled() || *self.status.borrow() != ChatbotStatus::Running
    }
}

enum LineRead {
    Line,
    Oversize,
    Eof,
}

/// Reads up to `MAX_LINE_BYTES` of one line into `buf`. A longer line is
/// skipped through its terminator without buffering the rest of it.
async fn read_capped_line(reader: &mut ChatReader, buf: &mut Vec<u8>) -> io::Result<LineRead> {
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') || n < MAX_LINE_BYTES {
        return Ok(LineRead::Line);
    }

    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(LineRead::Eof);
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(LineRead::Oversize);
        }
    }
}
