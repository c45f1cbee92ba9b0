//! One polling cycle: list the inbox, look up reviewers, classify, and
//! optionally mute.

use crate::classify::{self, Action, Decision, Tally};
use crate::config::CycleSettings;
use crate::github::{GithubClient, Notification, ReviewerSet, UnreadNotifications};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// How often to poll before GitHub has told us otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// The GitHub operations a cycle needs.
#[async_trait]
pub trait NotificationSource: Sync {
    async fn list_unread(
        &self,
        last_modified: Option<&str>,
    ) -> anyhow::Result<UnreadNotifications>;

    async fn requested_reviewers(&self, subject_url: &str) -> anyhow::Result<ReviewerSet>;

    async fn mark_thread_read(&self, thread_id: &str) -> anyhow::Result<()>;

    async fn ignore_thread(&self, thread_id: &str) -> anyhow::Result<()>;

    /// Root that subject URLs are expected to start with.
    fn api_root(&self) -> &str;
}

#[async_trait]
impl NotificationSource for GithubClient {
    async fn list_unread(
        &self,
        last_modified: Option<&str>,
    ) -> anyhow::Result<UnreadNotifications> {
        GithubClient::list_unread(self, last_modified).await
    }

    async fn requested_reviewers(&self, subject_url: &str) -> anyhow::Result<ReviewerSet> {
        GithubClient::requested_reviewers(self, subject_url).await
    }

    async fn mark_thread_read(&self, thread_id: &str) -> anyhow::Result<()> {
        GithubClient::mark_thread_read(self, thread_id).await
    }

    async fn ignore_thread(&self, thread_id: &str) -> anyhow::Result<()> {
        GithubClient::ignore_thread(self, thread_id).await
    }

    fn api_root(&self) -> &str {
        self.api_url()
    }
}

/// What the poller remembers between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    /// `Last-Modified` of the last successful listing.
    pub last_modified: Option<String>,
    pub poll_interval: Duration,
}

impl CycleState {
    pub fn new(poll_interval: Duration) -> Self {
        CycleState {
            last_modified: None,
            poll_interval,
        }
    }

    /// Takes over the hints of a successful cycle. Missing hints keep the
    /// previous values.
    pub fn update(&mut self, report: &CycleReport) {
        if let Some(lm) = &report.last_modified {
            self.last_modified = Some(lm.clone());
        }
        if let Some(interval) = report.poll_interval {
            self.poll_interval = interval;
        }
    }
}

impl Default for CycleState {
    fn default() -> Self {
        CycleState::new(DEFAULT_POLL_INTERVAL)
    }
}

#[derive(Debug)]
pub enum Mutation {
    /// Dry run, or the decision was not Mute.
    NotAttempted,
    Applied,
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct Outcome {
    pub decision: Decision,
    pub mutation: Mutation,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    /// GitHub said the inbox did not change; `outcomes` is empty.
    pub not_modified: bool,
    /// One entry per listed notification, in listing order.
    pub outcomes: Vec<Outcome>,
    pub mutation_errors: usize,
    pub last_modified: Option<String>,
    pub poll_interval: Option<Duration>,
}

impl CycleReport {
    pub fn tally(&self) -> Tally {
        Tally::from_decisions(self.outcomes.iter().map(|o| &o.decision))
    }

    /// Mute decisions whose mutation went through (or would have, in a dry
    /// run).
    pub fn muted(&self) -> usize {
        self.tally().mute - self.mutation_errors
    }
}

/// Runs one cycle against `source`.
///
/// An error means the inbox could not be listed. Reviewer and mutation
/// failures are recorded in the report instead.
pub async fn run_cycle<S: NotificationSource + ?Sized>(
    source: &S,
    state: &CycleState,
    settings: &CycleSettings,
) -> anyhow::Result<CycleReport> {
    let listing = source.list_unread(state.last_modified.as_deref()).await?;
    let mut report = CycleReport {
        not_modified: listing.not_modified,
        last_modified: listing.last_modified,
        poll_interval: listing.poll_interval,
        ..CycleReport::default()
    };
    if listing.not_modified {
        tracing::debug!("inbox not modified");
        return Ok(report);
    }
    tracing::debug!("fetched {} unread notifications", listing.notifications.len());

    let mut reviewers_by_url = HashMap::new();
    resolve_reviewers(
        source,
        &listing.notifications,
        settings,
        &mut reviewers_by_url,
    )
    .await;

    let decisions = classify::classify_all(
        &listing.notifications,
        &reviewers_by_url,
        &settings.login,
        &settings.filter,
    );

    for decision in decisions {
        let mutation = if settings.apply && decision.action == Action::Mute {
            mute(source, &decision.notification).await
        } else {
            Mutation::NotAttempted
        };
        if matches!(mutation, Mutation::Failed(_)) {
            report.mutation_errors += 1;
        }
        report.outcomes.push(Outcome { decision, mutation });
    }

    Ok(report)
}

/// Looks up reviewers for every notification that needs them, at most once
/// per subject URL. Failed lookups are stored as `None`.
pub async fn resolve_reviewers<S: NotificationSource + ?Sized>(
    source: &S,
    notifications: &[Notification],
    settings: &CycleSettings,
    reviewers_by_url: &mut HashMap<String, Option<ReviewerSet>>,
) {
    for n in notifications {
        if !classify::needs_reviewer_lookup(n, &settings.filter)
            || reviewers_by_url.contains_key(&n.subject.url)
        {
            continue;
        }
        let reviewers = match source.requested_reviewers(&n.subject.url).await {
            Ok(reviewers) => Some(reviewers),
            Err(e) => {
                tracing::warn!("{e:?}");
                None
            }
        };
        reviewers_by_url.insert(n.subject.url.clone(), reviewers);
    }
}

/// Marks the thread read, then ignores it. Stops at the first failure.
async fn mute<S: NotificationSource + ?Sized>(source: &S, n: &Notification) -> Mutation {
    let result = match source.mark_thread_read(&n.id).await {
        Ok(()) => source.ignore_thread(&n.id).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            tracing::info!("muted thread {} ({})", n.id, n.repository.full_name);
            Mutation::Applied
        }
        Err(e) => {
            tracing::warn!("failed to mute thread {}: {e:?}", n.id);
            Mutation::Failed(e)
        }
    }
}
