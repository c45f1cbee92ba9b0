//! Text rows and summaries printed to stdout.

use crate::classify::Decision;
use crate::cycle::{CycleReport, Mutation};
use crate::github::PullRequestRef;
use chrono::{DateTime, SecondsFormat, Utc};

/// `owner/repo#number`, or just `owner/repo` when the subject URL is not a
/// pull request.
pub fn label(d: &Decision, api_root: &str) -> String {
    let repo = &d.notification.repository.full_name;
    match PullRequestRef::from_subject_url(&d.notification.subject.url, api_root) {
        Ok(pr) => format!("{repo}#{}", pr.number),
        Err(_) => repo.clone(),
    }
}

/// A dry-run line: what would happen and why.
pub fn decision_row(d: &Decision, api_root: &str) -> String {
    let action = format!("{} ({})", d.action, d.reason);
    format!(
        "{:<40}  {:<90}  {}",
        label(d, api_root),
        d.notification.subject.title,
        action
    )
}

/// The result of muting one thread.
pub fn mutation_row(d: &Decision, error: Option<&anyhow::Error>, api_root: &str) -> String {
    let label = label(d, api_root);
    let title = &d.notification.subject.title;
    match error {
        Some(e) => format!("ERROR  {label}  {title:?}  {e:#}"),
        None => format!("MUTED  {label}  {title:?}"),
    }
}

/// The per-notification lines for a cycle: every decision in a dry run,
/// only the attempted mutations otherwise.
pub fn outcome_rows(report: &CycleReport, apply: bool, api_root: &str) -> Vec<String> {
    report
        .outcomes
        .iter()
        .filter_map(|o| match (&o.mutation, apply) {
            (_, false) => Some(decision_row(&o.decision, api_root)),
            (Mutation::NotAttempted, true) => None,
            (Mutation::Applied, true) => Some(mutation_row(&o.decision, None, api_root)),
            (Mutation::Failed(e), true) => Some(mutation_row(&o.decision, Some(e), api_root)),
        })
        .collect()
}

/// The closing line of a single run.
pub fn summary(report: &CycleReport) -> String {
    let tally = report.tally();
    let scanned = tally.total();
    let muted = report.muted();
    let errors = report.mutation_errors;
    let applied = report
        .outcomes
        .iter()
        .any(|o| matches!(o.mutation, Mutation::Applied));
    if errors > 0 {
        format!("\nDone: {scanned} scanned, {muted} muted, {errors} errors")
    } else if applied {
        format!("\nDone: {scanned} scanned, {muted} muted")
    } else {
        format!(
            "\nSummary: {scanned} scanned, {muted} spam, {} kept, {} skipped",
            tally.keep, tally.skip
        )
    }
}

/// One timestamped line per daemon cycle.
pub fn daemon_cycle_summary(now: DateTime<Utc>, report: &CycleReport) -> String {
    let ts = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    if report.not_modified {
        return format!("{ts}  cycle: not modified\n");
    }
    format!(
        "{ts}  cycle: {} scanned, {} muted, {} errors\n",
        report.outcomes.len(),
        report.muted(),
        report.mutation_errors
    )
}
