//! monesi: a shared feed reader bot for Mastodon.
//!
//! Users subscribe feeds by mentioning the bot; new entries are tooted as
//! they appear. The feed engine ([`manager::FeedManager`] and
//! [`command::CommandDispatcher`]) is independent of Mastodon and is driven
//! the same way by the bot worker and by the console.

pub mod bot;
pub mod command;
pub mod config;
pub mod feed;
pub mod manager;
pub mod storage;
pub mod subscription;
pub mod util;
