use chrono::{SubsecRound, Utc};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::feeds::{parse, select_new_posts, Feed, FeedClient};
use crate::mailout::{DispatchReport, Mailer};
use crate::store::Store;

const SOURCE_PREVIEW_CHARS: usize = 100;

/// Where a poll cycle currently is. Exactly one phase is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Parsing,
    Selecting,
    Dispatching,
}

#[derive(Debug, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was still running; nothing was done.
    AlreadyRunning,
    NoNewPosts,
    Mailed { posts: usize, report: DispatchReport },
}

/// Polls the feeds and mails subscribers about posts newer than the watermark.
pub struct Poller {
    store: Arc<dyn Store>,
    feed_client: FeedClient,
    mailer: Arc<Mailer>,
    feed_urls: Vec<String>,
    phase: Mutex<CyclePhase>,
}

/// Puts the poller back to idle when a cycle ends, however it ends.
struct CycleGuard<'a> {
    phase: &'a Mutex<CyclePhase>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = CyclePhase::Idle;
    }
}

impl Poller {
    pub fn new(
        store: Arc<dyn Store>,
        feed_client: FeedClient,
        mailer: Arc<Mailer>,
        feed_urls: Vec<String>,
    ) -> Self {
        Poller {
            store,
            feed_client,
            mailer,
            feed_urls,
            phase: Mutex::new(CyclePhase::Idle),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs a cycle right away, then one every `every`. Each cycle runs on its
    /// own task; a tick that lands while a cycle is still going is skipped by it.
    pub async fn run_forever(self: Arc<Self>, every: Duration) {
        let mut timer = tokio::time::interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            feeds = self.feed_urls.len(),
            "Polling feeds every {} seconds",
            every.as_secs()
        );

        loop {
            timer.tick().await;
            let poller = Arc::clone(&self);
            tokio::spawn(async move {
                poller.run_cycle().await;
            });
        }
    }

    /// One pass of fetch, parse, select, advance the watermark, dispatch.
    #[tracing::instrument(name = "Checking feeds for new posts", skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = match self.begin() {
            Some(guard) => guard,
            None => {
                tracing::warn!("A poll cycle is already running, skipping this one");
                return CycleOutcome::AlreadyRunning;
            }
        };

        let now = Utc::now().trunc_subsecs(3);
        let since = self.store.get().last_mailout;

        let sources = join_all(
            self.feed_urls
                .iter()
                .map(|url| self.feed_client.fetch(url, since)),
        )
        .await;

        self.enter(CyclePhase::Parsing);
        let feeds: Vec<Feed> = self
            .feed_urls
            .iter()
            .zip(sources)
            .filter_map(|(url, source)| {
                let source = source?;
                match parse(&source) {
                    Ok(feed) => Some(feed),
                    Err(err) => {
                        let preview: String = source.chars().take(SOURCE_PREVIEW_CHARS).collect();
                        tracing::error!("Failed to parse {}: {}. Source preview: {:?}", url, err, preview);
                        None
                    }
                }
            })
            .collect();

        self.enter(CyclePhase::Selecting);
        let posts = select_new_posts(&feeds, since);

        tracing::info!(
            "Found {} new posts since {}: {}",
            posts.len(),
            since.to_rfc3339(),
            posts
                .iter()
                .map(|post| post.title.as_str())
                .collect::<Vec<_>>()
                .join("/")
        );

        if posts.is_empty() {
            tracing::info!("No new posts to send");
            return CycleOutcome::NoNewPosts;
        }

        // The watermark moves before delivery; failed sends are not retried.
        let mut state = self.store.get();
        state.last_mailout = state.last_mailout.max(now);
        let subscribers = state.active_subscribers();
        if let Err(err) = self.store.save(state) {
            tracing::error!("Failed to persist the new watermark: {:?}", err);
        }

        tracing::info!("Found {} active subscribers", subscribers.len());

        self.enter(CyclePhase::Dispatching);
        let report = self.mailer.dispatch(&subscribers, &posts).await;

        tracing::info!(
            sent = report.sent,
            dry_run = report.dry_run,
            failed = report.failed.len(),
            "Check completed"
        );

        CycleOutcome::Mailed {
            posts: posts.len(),
            report,
        }
    }

    fn begin(&self) -> Option<CycleGuard<'_>> {
        let mut phase = self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if *phase != CyclePhase::Idle {
            return None;
        }
        *phase = CyclePhase::Fetching;

        Some(CycleGuard { phase: &self.phase })
    }

    fn enter(&self, next: CyclePhase) {
        tracing::debug!("Poll cycle entering {:?}", next);
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }
}
