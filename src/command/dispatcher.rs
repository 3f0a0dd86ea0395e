use thiserror::Error;

use super::grammar::ParsedCommand;
use crate::manager::{FeedManager, ManagerError};
use crate::util::chunk_lines;

/// Upper bound, in characters, of one `list` message.
pub const LIST_CHUNK_CHARS: usize = 400;

pub const HELP_TEXT: &str = "\
commands for monesi
  subscribe <url> as <feed id> [with <options>]
  unsubscribe <feed id>
  fetch
  list
  show_articles <feed id>
  show_meta <url>
  version
  help
  end | quit
subscribe options
  meta_filter(<name>=<value>)
  meta_filter(<name>=~/<regex>/)
  feed_author_filter(<author>)
  tag(<tag>[, <tag>...])
  redirect_url";

pub fn version_text() -> String {
    format!("Monesi: feed reader for Mastodon {}", env!("CARGO_PKG_VERSION"))
}

/// Raised by `end`/`quit`; the caller should close the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session ended")]
pub struct SessionEnded;

/// Runs command lines against a [`FeedManager`].
///
/// Every failure of a command is reported through the sink as one
/// `something wrong with '<input>' <error>` message. Only [`SessionEnded`]
/// is returned to the caller.
pub struct CommandDispatcher {
    manager: FeedManager,
}

impl CommandDispatcher {
    pub fn new(manager: FeedManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &FeedManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut FeedManager {
        &mut self.manager
    }

    pub async fn dispatch(
        &mut self,
        text: &str,
        sink: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), SessionEnded> {
        let command = ParsedCommand::from_input(text);
        if command == ParsedCommand::EndSession {
            return Err(SessionEnded);
        }

        if let Err(e) = self.execute(command, sink).await {
            tracing::warn!(input = %text.trim(), error = %e, "Command failed");
            sink(format!("something wrong with '{}' {}", text.trim(), e));
        }
        Ok(())
    }

    async fn execute(
        &mut self,
        command: ParsedCommand,
        sink: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), ManagerError> {
        match command {
            ParsedCommand::Subscribe { url, id, options } => {
                self.manager.subscribe(&id, &url, options).await?;
                sink(format!("subscribed {url} as {id}"));
            }
            ParsedCommand::Unsubscribe(id) => {
                self.manager.unsubscribe(&id).await?;
                sink(format!("unsubscribed {id}"));
            }
            ParsedCommand::List => {
                let lines = self.manager.list_lines();
                if lines.is_empty() {
                    sink("no subscriptions".to_string());
                }
                for chunk in chunk_lines(lines, LIST_CHUNK_CHARS) {
                    sink(chunk.trim_end_matches('\n').to_string());
                }
            }
            ParsedCommand::Fetch => {
                self.manager.fetch().await?;
                self.manager.new_entries(sink).await?;
                sink("fetched".to_string());
            }
            ParsedCommand::ShowArticles(id) => self.manager.show_articles(&id, sink).await?,
            ParsedCommand::ShowMeta(url) => self.manager.show_meta(&url, sink).await?,
            ParsedCommand::Version => sink(version_text()),
            ParsedCommand::Help => sink(HELP_TEXT.to_string()),
            ParsedCommand::Unrecognized(e) => {
                tracing::debug!(error = %e, "Unrecognized command");
                sink(HELP_TEXT.to_string());
            }
            ParsedCommand::EndSession => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_text() {
        assert_eq!(version_text(), "Monesi: feed reader for Mastodon 0.6.2");
    }

    #[test]
    fn test_help_mentions_every_command() {
        for word in [
            "subscribe",
            "unsubscribe",
            "fetch",
            "list",
            "show_articles",
            "show_meta",
            "version",
            "help",
            "quit",
            "meta_filter",
            "feed_author_filter",
            "tag(",
            "redirect_url",
        ] {
            assert!(HELP_TEXT.contains(word), "help text lacks {word}");
        }
    }
}
