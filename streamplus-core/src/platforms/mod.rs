// File: src/platforms/mod.rs

pub mod twitch_irc;
