use secrecy::SecretString;

/// Restricts which repository owners are processed.
///
/// Both filters compare case-insensitively and apply independently when
/// both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// Only notifications from this owner pass.
    pub include_org: Option<String>,
    /// Notifications from this owner never pass.
    pub exclude_org: Option<String>,
}

impl FilterConfig {
    pub fn new(include_org: Option<String>, exclude_org: Option<String>) -> Self {
        // An empty flag value means "no filter", same as leaving it off.
        FilterConfig {
            include_org: include_org.filter(|org| !org.is_empty()),
            exclude_org: exclude_org.filter(|org| !org.is_empty()),
        }
    }
}

/// Everything a cycle needs to know about the run it belongs to.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Login of the authenticated user.
    pub login: String,
    pub filter: FilterConfig,
    /// Mark muted threads read and ignore them. Off means dry run.
    pub apply: bool,
}

/// Finds the API token in `GH_TOKEN`, falling back to `GITHUB_TOKEN`.
pub fn token_from_env() -> anyhow::Result<SecretString> {
    std::env::var("GH_TOKEN")
        .or_else(|_| std::env::var("GITHUB_TOKEN"))
        .ok()
        .filter(|token| !token.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "GH_TOKEN environment variable is not set\n\n\
                Set a GitHub classic PAT with the 'notifications' scope:\n  \
                export GH_TOKEN=ghp_..."
            )
        })
}
