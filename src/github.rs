use reqwest::{
    blocking::{Client, Response},
    header::{ACCEPT, USER_AGENT},
};
use serde::Deserialize;
use thiserror::Error;

const GH_NOTIFICATIONS: &str = "https://api.github.com/notifications";
const GH_NOTIFICATION_THREAD: &str = "https://api.github.com/notifications/threads";
const GH_REPOS: &str = "https://api.github.com/repos";
const USER_AGENT_HEADER: &str = "octowatch/0.1";

pub fn build_client() -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT_HEADER)
        .build()
        .map_err(FetchError::Http)
}

/// Lists notification threads updated since the given ISO-8601 timestamp.
/// The `participating` query parameter is only sent when the filter is on,
/// matching the feed's default of returning everything.
pub fn list_notifications(
    client: &Client,
    token: &str,
    since: &str,
    participating: bool,
) -> Result<Vec<ThreadResponse>, FetchError> {
    if token.is_empty() {
        return Err(FetchError::MissingToken);
    }

    let mut request = client
        .get(GH_NOTIFICATIONS)
        .query(&[("since", since)])
        .header(USER_AGENT, USER_AGENT_HEADER)
        .header(ACCEPT, "application/vnd.github+json")
        .bearer_auth(token);
    if participating {
        request = request.query(&[("participating", "true")]);
    }

    decode_json(request.send()?)
}

/// Which comment endpoint a thread's latest comment lives under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentKind {
    Commit,
    PullRequest,
    Issue,
}

impl CommentKind {
    fn endpoint(&self, owner: &str, repo: &str, comment_id: &str) -> String {
        match self {
            CommentKind::Commit => format!("{GH_REPOS}/{owner}/{repo}/comments/{comment_id}"),
            CommentKind::PullRequest => {
                format!("{GH_REPOS}/{owner}/{repo}/pulls/comments/{comment_id}")
            }
            CommentKind::Issue => {
                format!("{GH_REPOS}/{owner}/{repo}/issues/comments/{comment_id}")
            }
        }
    }
}

/// Secondary fetch for one specific comment's body and author.
pub fn fetch_comment(
    client: &Client,
    token: &str,
    kind: CommentKind,
    owner: &str,
    repo: &str,
    comment_id: &str,
) -> Result<CommentResponse, FetchError> {
    if token.is_empty() {
        return Err(FetchError::MissingToken);
    }

    let response = client
        .get(kind.endpoint(owner, repo, comment_id))
        .header(USER_AGENT, USER_AGENT_HEADER)
        .header(ACCEPT, "application/vnd.github+json")
        .bearer_auth(token)
        .send()?;
    decode_json(response)
}

pub fn mark_thread_read(client: &Client, token: &str, thread_id: &str) -> Result<(), FetchError> {
    if token.is_empty() {
        return Err(FetchError::MissingToken);
    }

    let url = format!("{GH_NOTIFICATION_THREAD}/{thread_id}");
    let response = client
        .patch(url)
        .header(USER_AGENT, USER_AGENT_HEADER)
        .header(ACCEPT, "application/vnd.github+json")
        .bearer_auth(token)
        .send()?;
    if !response.status().is_success() {
        return Err(api_error(response));
    }
    Ok(())
}

fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    if !response.status().is_success() {
        return Err(api_error(response));
    }
    Ok(response.json()?)
}

fn api_error(response: Response) -> FetchError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    FetchError::Api {
        status,
        message: extract_api_message(&body),
    }
}

/// GitHub error payloads carry a structured `message` field; fall back to
/// echoing the raw body when they don't.
fn extract_api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiErrorBody {
        message: String,
    }

    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => format!("Failed to get error message from response:\n{body}"),
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GitHub API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Personal access token is missing")]
    MissingToken,
    #[error("Background fetch worker disconnected before returning a result")]
    WorkerGone,
}

impl FetchError {
    /// Best-effort human-readable description for the error alert.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Api { message, .. } => message.clone(),
            other => format!("Failed to get error message from response:\n{other}"),
        }
    }
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ThreadResponse {
    pub id: String,
    pub reason: String,
    pub subject: ThreadSubject,
    pub repository: ThreadRepository,
}

#[derive(Debug, Deserialize)]
pub struct ThreadSubject {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
    pub latest_comment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadRepository {
    pub name: String,
    pub full_name: String,
    pub owner: RepositoryOwner,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
    pub avatar_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentResponse {
    pub body: Option<String>,
    pub user: Option<CommentAuthor>,
}

#[derive(Debug, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
