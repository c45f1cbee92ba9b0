pub(crate) mod client;
mod notifications;
mod subject;

pub use client::{DEFAULT_API_URL, DEFAULT_RETRY_AFTER, GithubClient, MAX_RETRY_AFTER};
pub use notifications::*;
pub use subject::{PullRequestRef, SubjectParseError};
