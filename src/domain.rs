use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// Domain data structures shared across modules.

/// Capability invoked exactly once if the user dismisses a delivered alert.
/// Never persisted; restored records simply lose it.
pub type DismissFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectType {
    PullRequest,
    Issue,
    Commit,
    Other,
}

impl SubjectType {
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "PullRequest" => SubjectType::PullRequest,
            "Issue" => SubjectType::Issue,
            "Commit" => SubjectType::Commit,
            _ => SubjectType::Other,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubjectType::PullRequest => "PR",
            SubjectType::Issue => "Issue",
            SubjectType::Commit => "Commit",
            SubjectType::Other => "Thread",
        }
    }

    /// Path segment of the human-facing github.com URL for this subject
    /// kind. `Other` subjects have no canonical page layout.
    pub fn url_segment(&self) -> Option<&'static str> {
        match self {
            SubjectType::PullRequest => Some("pull"),
            SubjectType::Issue => Some("issues"),
            SubjectType::Commit => Some("commit"),
            SubjectType::Other => None,
        }
    }
}

/// One pending alert, built from a single notification thread. Immutable
/// after construction; a duplicate fetched later never replaces it.
#[derive(Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub subject_type: SubjectType,
    pub title: String,
    pub body: Option<String>,
    pub reason: String,
    pub repo_full_name: String,
    pub repo_owner_avatar_url: String,
    pub subject_id: String,
    pub subject_url: String,
    pub user_login: Option<String>,
    #[serde(skip)]
    pub on_dismiss: Option<DismissFn>,
}

impl fmt::Debug for NotificationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRecord")
            .field("id", &self.id)
            .field("subject_type", &self.subject_type)
            .field("title", &self.title)
            .field("body", &self.body)
            .field("reason", &self.reason)
            .field("repo_full_name", &self.repo_full_name)
            .field("subject_id", &self.subject_id)
            .field("subject_url", &self.subject_url)
            .field("user_login", &self.user_login)
            .field("has_dismiss", &self.on_dismiss.is_some())
            .finish()
    }
}

/// The single state aggregate, owned exclusively by the store.
#[derive(Clone, Debug, Default)]
pub struct ApplicationState {
    /// Set once the one-time token setup prompt has been shown. Not part of
    /// the persisted snapshot, so an unresolved prompt re-occurs after a
    /// restart.
    pub has_prompted_for_token: bool,
    /// Start time (epoch millis) of the most recent completed fetch cycle,
    /// including cycles that fetched nothing or failed.
    pub last_check_time: i64,
    /// Pending alerts in arrival order, unique by id.
    pub notifications: Vec<NotificationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_type_from_api_maps_known_kinds() {
        assert_eq!(
            SubjectType::from_api("PullRequest"),
            SubjectType::PullRequest
        );
        assert_eq!(SubjectType::from_api("Issue"), SubjectType::Issue);
        assert_eq!(SubjectType::from_api("Commit"), SubjectType::Commit);
        assert_eq!(SubjectType::from_api("Release"), SubjectType::Other);
    }

    #[test]
    fn other_subjects_have_no_url_segment() {
        assert_eq!(SubjectType::PullRequest.url_segment(), Some("pull"));
        assert_eq!(SubjectType::Other.url_segment(), None);
    }
}
