use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::distributor::TootQueue;
use super::mastodon::{Mention, StatusPoster};
use crate::command::CommandDispatcher;
use crate::config::Visibility;

/// One unit of work for the bot's single worker.
#[derive(Debug)]
pub enum WorkItem {
    /// Run the command contained in a mention and reply to it.
    Mention(Mention),
    /// Fetch every feed and queue toots for the new entries.
    Fetch,
}

/// Executes work items strictly one after another.
///
/// The worker is the only owner of the dispatcher, and through it of the
/// feed manager, so commands and fetch cycles never interleave.
pub struct Worker {
    dispatcher: CommandDispatcher,
    poster: Arc<dyn StatusPoster>,
    toots: TootQueue,
}

impl Worker {
    pub fn new(dispatcher: CommandDispatcher, poster: Arc<dyn StatusPoster>, toots: TootQueue) -> Self {
        Self {
            dispatcher,
            poster,
            toots,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Drains the queue until every producer has gone away.
    pub async fn run(mut self, mut queue: mpsc::Receiver<WorkItem>) {
        while let Some(item) = queue.recv().await {
            self.handle(item).await;
        }
        tracing::info!("Work queue closed, worker stopping");
    }

    /// Handles one item. Failures are logged; nothing here stops the loop.
    pub async fn handle(&mut self, item: WorkItem) {
        match item {
            WorkItem::Mention(mention) => self.answer(mention).await,
            WorkItem::Fetch => self.fetch().await,
        }
    }

    async fn answer(&mut self, mention: Mention) {
        tracing::info!(from = %mention.account, text = %mention.text, "Running command");
        // The sink is synchronous and posting is not, so replies are
        // collected first and posted in order afterwards.
        let mut replies = Vec::new();
        let mut sink = |message: String| replies.push(message);
        if self.dispatcher.dispatch(&mention.text, &mut sink).await.is_err() {
            tracing::info!(from = %mention.account, "Ignoring end of session from a mention");
        }

        for reply in replies {
            let answer = format!("@{}\n{}", mention.account, reply);
            tracing::debug!(answer = %answer, "Replying");
            if let Err(e) = self
                .poster
                .post_status(&answer, Some(&mention.status_id), Visibility::Direct)
                .await
            {
                tracing::warn!(to = %mention.account, error = %e, "Failed to post reply");
            }
        }
    }

    async fn fetch(&mut self) {
        tracing::info!("Fetching feeds");
        if let Err(e) = self.dispatcher.manager_mut().fetch().await {
            tracing::warn!(error = %e, "Fetch cycle failed");
        }

        let toots = &self.toots;
        let mut sink = |toot: String| toots.post(toot);
        if let Err(e) = self.dispatcher.manager().new_entries(&mut sink).await {
            tracing::warn!(error = %e, "Rendering new entries failed");
        }
    }
}

const MIN_FETCH_INTERVAL: Duration = Duration::from_secs(1);

/// Pushes a [`WorkItem::Fetch`] immediately and then every `interval`
/// (at least one second), until the queue is closed.
pub fn spawn_fetch_timer(queue: mpsc::Sender<WorkItem>, interval: Duration) -> JoinHandle<()> {
    let period = interval.max(MIN_FETCH_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::debug!("Queueing fetch");
            if queue.send(WorkItem::Fetch).await.is_err() {
                break;
            }
        }
    })
}
