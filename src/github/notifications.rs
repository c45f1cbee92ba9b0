//! The notifications inbox and the pull request lookups it needs.

use super::{GithubClient, PullRequestRef};
use anyhow::Context;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::time::Duration;
use url::Url;

const PER_PAGE: &str = "50";

/// One thread in the authenticated user's inbox.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Notification {
    /// The thread id, used by the mark-read and subscription endpoints.
    pub id: String,
    pub reason: NotificationReason,
    pub subject: Subject,
    pub repository: NotificationRepository,
}

/// Why the user received a notification.
///
/// Only `review_requested` drives any decision; the rest are kept so they
/// show up sensibly in logs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationReason {
    ReviewRequested,
    Mention,
    TeamMention,
    Author,
    Comment,
    Assign,
    Subscribed,
    StateChange,
    CiActivity,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Subject {
    pub title: String,
    /// The API URL of the thing the notification is about.
    ///
    /// Example: `https://api.github.com/repos/octocat/Hello-World/pulls/1347`
    ///
    /// GitHub leaves this null for some subject types (releases, discussions).
    #[serde(default, deserialize_with = "opt_string")]
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SubjectType,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum SubjectType {
    PullRequest,
    Issue,
    Commit,
    Release,
    Discussion,
    CheckSuite,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct NotificationRepository {
    /// `owner/name`
    pub full_name: String,
    pub owner: User,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Team {
    pub slug: String,
}

/// The people and teams whose review is still requested on a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct ReviewerSet {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub teams: Vec<Team>,
}

/// Everything one listing of the inbox produced.
#[derive(Debug, Default)]
pub struct UnreadNotifications {
    pub notifications: Vec<Notification>,
    /// The inbox has not changed since the `If-Modified-Since` we sent.
    pub not_modified: bool,
    /// `Last-Modified` of the first page, to send on the next listing.
    pub last_modified: Option<String>,
    /// `X-Poll-Interval` of the first page.
    pub poll_interval: Option<Duration>,
}

fn opt_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    use serde::de::Deserialize;
    Ok(<Option<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl GithubClient {
    /// Returns the login of the user the token belongs to.
    pub async fn current_user(&self) -> anyhow::Result<String> {
        let user: User = self
            .json(self.get(&format!("{}/user", self.api_url())))
            .await
            .context("fetch login")?;
        Ok(user.login)
    }

    /// Lists every unread notification, one page at a time until GitHub
    /// returns an empty page.
    ///
    /// `last_modified` is sent as `If-Modified-Since` on the first page; a
    /// 304 there ends the listing with `not_modified` set.
    pub async fn list_unread(
        &self,
        last_modified: Option<&str>,
    ) -> anyhow::Result<UnreadNotifications> {
        let mut result = UnreadNotifications::default();

        for page in 1u32.. {
            let page_param = page.to_string();
            let url = Url::parse_with_params(
                &format!("{}/notifications", self.api_url()),
                &[("per_page", PER_PAGE), ("page", page_param.as_str())],
            )
            .context("building notifications URL")?;

            let mut req = self.get(url.as_str());
            if page == 1
                && let Some(since) = last_modified.filter(|s| !s.is_empty())
            {
                req = req.header(IF_MODIFIED_SINCE, since);
            }

            let resp = self
                .send(req)
                .await
                .with_context(|| format!("list notifications page {page}"))?;

            if page == 1 {
                capture_poll_metadata(resp.headers(), &mut result);
            }
            if resp.status() == StatusCode::NOT_MODIFIED {
                result.not_modified = true;
                return Ok(result);
            }
            if resp.status() != StatusCode::OK {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!(
                    "list notifications page {page}: unexpected status {status}: {body}"
                );
            }

            let notifications: Vec<Notification> = resp
                .json()
                .await
                .with_context(|| format!("list notifications page {page}"))?;
            if notifications.is_empty() {
                break;
            }
            tracing::debug!("page {page}: {} notifications", notifications.len());
            result.notifications.extend(notifications);
        }

        Ok(result)
    }

    /// Fetches the outstanding review requests of the pull request a
    /// notification subject points at.
    pub async fn requested_reviewers(&self, subject_url: &str) -> anyhow::Result<ReviewerSet> {
        let pr = PullRequestRef::from_subject_url(subject_url, self.api_url())
            .context("get reviewers")?;
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/requested_reviewers",
            self.api_url(),
            pr.owner,
            pr.repo,
            pr.number
        );
        self.json(self.get(&url))
            .await
            .with_context(|| format!("get reviewers for {pr}"))
    }

    pub async fn mark_thread_read(&self, thread_id: &str) -> anyhow::Result<()> {
        let url = format!("{}/notifications/threads/{thread_id}", self.api_url());
        self.send_req(self.patch(&url))
            .await
            .with_context(|| format!("mark thread {thread_id} read"))?;
        Ok(())
    }

    /// Ignores all future notifications for a thread.
    pub async fn ignore_thread(&self, thread_id: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/notifications/threads/{thread_id}/subscription",
            self.api_url()
        );
        self.send_req(
            self.put(&url)
                .json(&serde_json::json!({ "ignored": true })),
        )
        .await
        .with_context(|| format!("ignore thread {thread_id}"))?;
        Ok(())
    }
}

fn capture_poll_metadata(headers: &HeaderMap, result: &mut UnreadNotifications) {
    if let Some(lm) = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        result.last_modified = Some(lm.to_string());
    }
    if let Some(secs) = headers
        .get("X-Poll-Interval")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
    {
        result.poll_interval = Some(Duration::from_secs(secs));
    }
}
