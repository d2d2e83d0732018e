//! src/platforms/twitch_irc/message.rs
//!
//! Turns raw Twitch IRC lines into `ChatMessage`s. The tag block is split on
//! `;` and `=` into a map, so the order in which Twitch sends tags does not matter.

use std::collections::HashMap;

use crate::models::{ChatMessage, MessageChannel};

pub const PING_LINE: &str = "PING :tmi.twitch.tv";
pub const PONG_LINE: &str = "PONG :tmi.twitch.tv";

const USER_HOST_SUFFIX: &str = ".tmi.twitch.tv";

/// Tokenized IRC line: `@tags :prefix COMMAND params :trailing`.
#[derive(Debug, Clone, PartialEq)]
pub struct IrcLine {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcLine {
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return None;
        }

        // 1) tags
        let mut tags = HashMap::new();
        if let Some(tagged) = rest.strip_prefix('@') {
            let space_pos = tagged.find(' ')?;
            tags = parse_tags(&tagged[..space_pos]);
            rest = tagged[space_pos + 1..].trim_start();
        }

        // 2) prefix
        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let space_pos = prefixed.find(' ')?;
            prefix = Some(prefixed[..space_pos].to_string());
            rest = prefixed[space_pos + 1..].trim_start();
        }

        // 3) command
        let (command, mut rest) = match rest.find(' ') {
            Some(space_pos) => (&rest[..space_pos], &rest[space_pos + 1..]),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        // 4) middle params, then trailing after the first ':'
        let mut params = Vec::new();
        let mut trailing = None;
        while !rest.is_empty() {
            if let Some(t) = rest.strip_prefix(':') {
                trailing = Some(t.to_string());
                break;
            }
            match rest.find(' ') {
                Some(space_pos) => {
                    params.push(rest[..space_pos].to_string());
                    rest = rest[space_pos + 1..].trim_start();
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
            trailing,
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

fn parse_tags(block: &str) -> HashMap<String, String> {
    block
        .split(';')
        .filter(|kv| !kv.is_empty())
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) => (k.to_string(), unescape_tag_value(v)),
            None => (kv.to_string(), String::new()),
        })
        .collect()
}

/// IRCv3 tag value escaping: `\:` `\s` `\\` `\r` `\n`.
fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// What the parser needs to know about the joined channel.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Channel login without `#`.
    pub channel: String,
    /// Display name of the channel owner, for the broadcaster flag.
    pub broadcaster_display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    /// The server keepalive; answer with `PONG_LINE`.
    Ping,
    Chat(ChatMessage),
    /// Dropped, with the reason for the debug log.
    Ignored(&'static str),
}

pub fn classify_line(raw: &str, ctx: &ParseContext) -> InboundLine {
    let raw = raw.trim_end_matches(['\r', '\n']);
    if raw == PING_LINE {
        return InboundLine::Ping;
    }

    let Some(line) = IrcLine::parse(raw) else {
        return InboundLine::Ignored("unparseable line");
    };

    let from_user = line
        .prefix
        .as_deref()
        .is_some_and(|p| p.to_ascii_lowercase().ends_with(USER_HOST_SUFFIX));
    if !from_user {
        return InboundLine::Ignored("not sent by a chat user");
    }

    let channel = match line.command.as_str() {
        "PRIVMSG" => MessageChannel::Public,
        "WHISPER" => MessageChannel::Private,
        _ => return InboundLine::Ignored("unsupported command"),
    };

    match channel {
        MessageChannel::Public => match public_message(&line, ctx) {
            Some(msg) => InboundLine::Chat(msg),
            None => InboundLine::Ignored("malformed PRIVMSG"),
        },
        MessageChannel::Private => InboundLine::Ignored("whispers are not supported"),
    }
}

fn public_message(line: &IrcLine, ctx: &ParseContext) -> Option<ChatMessage> {
    let target = line.params.first()?;
    let joined = target
        .strip_prefix('#')
        .is_some_and(|name| name.eq_ignore_ascii_case(&ctx.channel));
    if !joined {
        return None;
    }
    let body = line.trailing.clone()?;

    let author = non_empty(line.tag("display-name")?)?;
    let color = line.tag("color")?.to_string();
    let message_id = non_empty(line.tag("id")?)?;
    let is_moderator = flag(line.tag("mod")?)?;
    let is_subscriber = flag(line.tag("subscriber")?)?;
    let is_broadcaster = author == ctx.broadcaster_display_name;

    Some(ChatMessage {
        channel: MessageChannel::Public,
        message_id,
        color,
        author,
        body,
        is_broadcaster,
        is_moderator,
        is_subscriber,
    })
}

fn non_empty(v: &str) -> Option<String> {
    if v.is_empty() { None } else { Some(v.to_string()) }
}

fn flag(v: &str) -> Option<bool> {
    match v {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}
