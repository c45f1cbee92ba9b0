use std::error;
use std::fmt;

/// A pull request identified by the API URL a notification subject points at.
///
/// Example: `https://api.github.com/repos/octocat/Hello-World/pulls/1347`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectParseError {
    /// The URL does not start with `<api root>/repos/`.
    UnexpectedRoot { url: String },
    /// The path is not exactly `<owner>/<repo>/pulls/<number>`.
    UnexpectedShape { url: String },
    /// The last segment is not a positive decimal integer.
    InvalidNumber { url: String },
}

impl error::Error for SubjectParseError {}

impl fmt::Display for SubjectParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubjectParseError::UnexpectedRoot { url } => {
                write!(f, "unexpected URL prefix: {url}")
            }
            SubjectParseError::UnexpectedShape { url } => {
                write!(f, "unexpected URL structure: {url}")
            }
            SubjectParseError::InvalidNumber { url } => {
                write!(f, "invalid PR number in URL {url}")
            }
        }
    }
}

impl PullRequestRef {
    /// Parses a subject URL rooted at `api_root` (no trailing slash).
    pub fn from_subject_url(url: &str, api_root: &str) -> Result<Self, SubjectParseError> {
        let rest = url
            .strip_prefix(api_root.trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix("/repos/"))
            .ok_or_else(|| SubjectParseError::UnexpectedRoot {
                url: url.to_string(),
            })?;

        let parts: Vec<&str> = rest.split('/').collect();
        let [owner, repo, "pulls", number] = parts[..] else {
            return Err(SubjectParseError::UnexpectedShape {
                url: url.to_string(),
            });
        };
        if owner.is_empty() || repo.is_empty() {
            return Err(SubjectParseError::UnexpectedShape {
                url: url.to_string(),
            });
        }

        // `u64::from_str` accepts a leading `+`, which is not a valid PR number.
        let number = Some(number)
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| SubjectParseError::InvalidNumber {
                url: url.to_string(),
            })?;

        Ok(PullRequestRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        })
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}
