//! Issue payloads.

use serde::Deserialize;
use serde::de::IgnoredAny;

/// Title marker identifying porting requests.
const TITLE_MARKER: &str = "[PORTER]";

/// An issue as returned by the REST API (only the fields porter reads).
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct Issue {
    /// Issue number within its repository.
    pub number: u64,
    /// Issue title.
    pub title: String,
    /// API URL of the owning repository.
    pub repository_url: String,
    /// Browser URL of the issue.
    #[serde(default)]
    pub html_url: String,
    /// Issue author.
    pub user: User,
    /// Present when the issue is a pull request.
    #[serde(default)]
    pull_request: Option<IgnoredAny>,
}

/// Issue author.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct User {
    /// Account login.
    pub login: String,
}

impl Issue {
    /// Returns `(owner, repo)` from the repository URL.
    pub fn repo(&self) -> Option<(&str, &str)> {
        let mut parts = self.repository_url.trim_end_matches('/').rsplit('/');
        let repo = parts.next().filter(|s| !s.is_empty())?;
        let owner = parts.next().filter(|s| !s.is_empty())?;
        Some((owner, repo))
    }

    /// Returns the requested image: the title without its `[PORTER]`
    /// marker, trimmed.
    pub fn image(&self) -> String {
        self.title.replacen(TITLE_MARKER, "", 1).trim().to_owned()
    }

    /// Returns `true` if this entry is a pull request.
    pub const fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}
