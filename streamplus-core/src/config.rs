//! Runtime configuration for the chatbot.
//!
//! Every field has a default, so an absent or partial JSON file is fine.
//! `STREAMPLUS_*` environment variables are applied on top of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatServerConfig {
    pub host: String,
    pub port: u16,
    /// Wrap the socket in TLS (Twitch serves TLS on 6697).
    pub tls: bool,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated from the server before the link counts as dead.
    pub read_timeout_secs: u64,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        Self {
            host: "irc.chat.twitch.tv".to_string(),
            port: 6667,
            tls: false,
            connect_timeout_secs: 10,
            read_timeout_secs: 360,
        }
    }
}

impl ChatServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    pub client_id: String,
    pub redirect_uri: String,

    pub authorize_url: String,
    pub validate_url: String,
    pub users_url: String,
    /// Base URL of the token relay that holds the client secret.
    pub relay_url: String,
    pub http_timeout_secs: u64,

    pub chat: ChatServerConfig,

    pub greeting: String,
    pub farewell: String,

    /// How often live access tokens are re-checked while running. 0 disables it.
    pub revalidate_interval_secs: u64,

    pub credentials_path: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            client_id: "xa54hwj838r3y1ou3da65e8nlu4b6r".to_string(),
            redirect_uri: "https://imtherayze.com/authentication".to_string(),
            authorize_url: "https://id.twitch.tv/oauth2/authorize".to_string(),
            validate_url: "https://id.twitch.tv/oauth2/validate".to_string(),
            users_url: "https://api.twitch.tv/helix/users".to_string(),
            relay_url: "http://localhost:8080".to_string(),
            http_timeout_secs: 15,
            chat: ChatServerConfig::default(),
            greeting: "/me connected [Rust]".to_string(),
            farewell: "/me disconnected [Rust]".to_string(),
            revalidate_interval_secs: 3600,
            credentials_path: None,
        }
    }
}

impl BotConfig {
    /// Reads `path` if given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("cannot read {}: {e}", p.display())))?;
                serde_json::from_str::<BotConfig>(&raw)
                    .map_err(|e| Error::Config(format!("cannot parse {}: {e}", p.display())))?
            }
            None => BotConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        debug!("(BotConfig) loaded => chat={}:{} tls={}", config.chat.host, config.chat.port, config.chat.tls);
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STREAMPLUS_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = lookup("STREAMPLUS_REDIRECT_URI") {
            self.redirect_uri = v;
        }
        if let Some(v) = lookup("STREAMPLUS_RELAY_URL") {
            self.relay_url = v;
        }
        if let Some(v) = lookup("STREAMPLUS_CREDENTIALS_PATH") {
            self.credentials_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("STREAMPLUS_CHAT_TLS") {
            self.chat.tls = parse_bool(&v)
                .ok_or_else(|| Error::Config(format!("STREAMPLUS_CHAT_TLS: not a boolean: {v}")))?;
            if self.chat.tls && self.chat.port == 6667 {
                self.chat.port = 6697;
            }
        }
        Ok(())
    }

    /// Configured path, or `<config dir>/StreamPlus/credentials.json`.
    pub fn credentials_path(&self) -> Result<PathBuf, Error> {
        if let Some(p) = &self.credentials_path {
            return Ok(p.clone());
        }
        dirs::config_dir()
            .map(|dir| dir.join("StreamPlus").join("credentials.json"))
            .ok_or_else(|| Error::Config("no per-user configuration directory on this platform".into()))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn revalidate_interval(&self) -> Option<Duration> {
        if self.revalidate_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.revalidate_interval_secs))
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
