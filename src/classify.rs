//! Decides what to do with each notification.
//!
//! Everything here is pure: the same notification, reviewers, login and
//! filter always produce the same [`Decision`].

use crate::config::FilterConfig;
use crate::github::{Notification, NotificationReason, ReviewerSet, SubjectType};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Not a review-requested PR, or not enough data to judge it.
    Skip,
    /// The user was asked for a review by name; leave it alone.
    Keep,
    /// The user is only reachable through a team; ignore and mark read.
    Mute,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Action::Skip => "SKIP",
            Action::Keep => "KEEP",
            Action::Mute => "MUTE",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub notification: Notification,
    pub action: Action,
    pub reason: &'static str,
}

impl Decision {
    fn new(notification: &Notification, action: Action, reason: &'static str) -> Self {
        Decision {
            notification: notification.clone(),
            action,
            reason,
        }
    }
}

pub fn matches_org_filter(n: &Notification, config: &FilterConfig) -> bool {
    let org = &n.repository.owner.login;
    if let Some(include) = &config.include_org
        && !org.eq_ignore_ascii_case(include)
    {
        return false;
    }
    if let Some(exclude) = &config.exclude_org
        && org.eq_ignore_ascii_case(exclude)
    {
        return false;
    }
    true
}

fn is_review_requested_pr(n: &Notification) -> bool {
    n.reason == NotificationReason::ReviewRequested && n.subject.kind == SubjectType::PullRequest
}

/// Whether `classify` could use the reviewers of this notification's pull
/// request. When this is false, no lookup is needed.
pub fn needs_reviewer_lookup(n: &Notification, config: &FilterConfig) -> bool {
    is_review_requested_pr(n) && matches_org_filter(n, config)
}

/// Classifies one notification.
///
/// `reviewers` is `None` when no lookup was done or the lookup failed; a
/// review request is then skipped rather than muted.
pub fn classify(
    n: &Notification,
    reviewers: Option<&ReviewerSet>,
    login: &str,
    config: &FilterConfig,
) -> Decision {
    if !matches_org_filter(n, config) {
        return Decision::new(n, Action::Skip, "filtered by org");
    }
    if !is_review_requested_pr(n) {
        return Decision::new(n, Action::Skip, "not a review-requested PR");
    }
    let Some(reviewers) = reviewers else {
        return Decision::new(n, Action::Skip, "no reviewer data");
    };
    if reviewers
        .users
        .iter()
        .any(|user| user.login.eq_ignore_ascii_case(login))
    {
        return Decision::new(n, Action::Keep, "direct review request");
    }
    // Also reached with no users and no teams at all.
    Decision::new(n, Action::Mute, "team-only review request")
}

/// Classifies a batch.
///
/// `reviewers_by_url` maps a subject URL to its reviewers, or to `None` when
/// the lookup failed.
pub fn classify_all(
    notifications: &[Notification],
    reviewers_by_url: &HashMap<String, Option<ReviewerSet>>,
    login: &str,
    config: &FilterConfig,
) -> Vec<Decision> {
    notifications
        .iter()
        .map(|n| {
            let reviewers = reviewers_by_url.get(&n.subject.url).and_then(Option::as_ref);
            classify(n, reviewers, login, config)
        })
        .collect()
}

/// Counts of each action in a batch of decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub skip: usize,
    pub keep: usize,
    pub mute: usize,
}

impl Tally {
    pub fn from_decisions<'a>(decisions: impl IntoIterator<Item = &'a Decision>) -> Self {
        let mut tally = Tally::default();
        for d in decisions {
            match d.action {
                Action::Skip => tally.skip += 1,
                Action::Keep => tally.keep += 1,
                Action::Mute => tally.mute += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.skip + self.keep + self.mute
    }
}
