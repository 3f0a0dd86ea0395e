//! Everything around the feed engine that talks to Mastodon or a terminal.
//!
//! - [`mastodon`] - REST/streaming client and the [`StatusPoster`] seam
//! - [`distributor`] - paced, de-duplicated posting of new entries
//! - [`worker`] - the single consumer of the work queue
//! - [`console`] - interactive line-based session
//! - [`setup`] - credential and config bootstrap

pub mod console;
pub mod distributor;
pub mod mastodon;
pub mod setup;
pub mod worker;

pub use distributor::{pause_after_post, TootDistributor, TootQueue};
pub use mastodon::{MastodonClient, MastodonError, Mention, StatusPoster};
pub use worker::{spawn_fetch_timer, WorkItem, Worker};
