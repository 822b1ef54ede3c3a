use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::domain::{DismissFn, NotificationRecord, SubjectType};
use crate::github::{self, CommentKind, FetchError, ThreadResponse};

/// Hard cap on alert body length, in characters. Simplistic on purpose:
/// markup characters count like any other, so the visual length may be
/// shorter.
pub const MAX_MESSAGE_LENGTH: usize = 500;

/// Everything one fetch cycle needs, captured at trigger time so an
/// overlapping settings change cannot tear a cycle in half.
pub struct FetchParams {
    pub token: String,
    pub since: String,
    pub participating_only: bool,
    pub mark_read_on_dismiss: bool,
}

/// Formats an epoch-millis check time the way the feed's `since` parameter
/// expects it.
pub fn since_timestamp(epoch_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Runs one fetch cycle: primary feed query, per-thread comment sub-fetch,
/// record construction. Threads whose subject cannot be resolved are
/// dropped individually; a transport failure on either fetch fails the
/// whole cycle so the caller can take the error path.
pub fn run_cycle(client: &Client, params: &FetchParams) -> Result<Vec<NotificationRecord>, FetchError> {
    let threads = github::list_notifications(
        client,
        &params.token,
        &params.since,
        params.participating_only,
    )?;
    debug!(count = threads.len(), "fetched notification threads");

    let mut records = Vec::with_capacity(threads.len());
    for thread in threads {
        if let Some(record) = build_record(client, params, thread)? {
            records.push(record);
        }
    }
    Ok(records)
}

fn build_record(
    client: &Client,
    params: &FetchParams,
    thread: ThreadResponse,
) -> Result<Option<NotificationRecord>, FetchError> {
    let subject_type = SubjectType::from_api(&thread.subject.kind);
    let Some(subject) = extract_subject(subject_type, &thread) else {
        debug!(thread_id = %thread.id, "dropping thread without a resolvable subject");
        return Ok(None);
    };

    let mut body = None;
    let mut user_login = None;
    if let Some(comment) = subject.comment {
        let fetched = github::fetch_comment(
            client,
            &params.token,
            comment.kind,
            &thread.repository.owner.login,
            &thread.repository.name,
            &comment.id,
        )?;
        body = fetched.body.as_deref().map(shape_body);
        user_login = fetched.user.map(|author| author.login);
    }

    let on_dismiss = dismiss_capability(params, &thread.id);
    Ok(Some(NotificationRecord {
        id: thread.id,
        subject_type,
        title: thread.subject.title,
        body,
        reason: thread.reason,
        repo_full_name: thread.repository.full_name,
        repo_owner_avatar_url: thread.repository.owner.avatar_url,
        subject_id: subject.id,
        subject_url: subject.url,
        user_login,
        on_dismiss,
    }))
}

/// When mark-read-on-dismiss is enabled, dismissing the delivered alert
/// marks the originating thread read. Runs on the dismiss-watcher thread,
/// so it builds its own client; failures are logged and swallowed.
fn dismiss_capability(params: &FetchParams, thread_id: &str) -> Option<DismissFn> {
    if !params.mark_read_on_dismiss {
        return None;
    }
    let token = params.token.clone();
    let thread_id = thread_id.to_owned();
    Some(Arc::new(move || {
        let outcome = github::build_client()
            .and_then(|client| github::mark_thread_read(&client, &token, &thread_id));
        if let Err(err) = outcome {
            warn!(%thread_id, error = %err, "failed to mark notification thread read");
        }
    }))
}

struct SubjectData {
    id: String,
    url: String,
    comment: Option<CommentRef>,
}

struct CommentRef {
    kind: CommentKind,
    id: String,
}

/// Derives the subject id (last path segment of the API subject URL) and
/// the canonical human-facing URL. Commit subjects keep the full sha;
/// everything else carries a numeric id. Returns `None` when no URL can be
/// derived, which drops the record from the batch.
fn extract_subject(subject_type: SubjectType, thread: &ThreadResponse) -> Option<SubjectData> {
    let api_url = thread.subject.url.as_deref()?;
    let id = api_url.rsplit('/').next()?.to_owned();
    if id.is_empty() {
        return None;
    }

    let url = match subject_type.url_segment() {
        Some(segment) => format!(
            "https://github.com/{}/{}/{}",
            thread.repository.full_name, segment, id
        ),
        // No canonical page layout for this subject kind; point at the API
        // URL's human-facing twin instead.
        None => api_url.replace("api.github.com/repos", "github.com"),
    };

    let comment = thread
        .subject
        .latest_comment_url
        .as_deref()
        .and_then(parse_comment_ref);

    Some(SubjectData { id, url, comment })
}

/// Comment origin URLs look like `…/{pulls|issues|commits}/comments/{id}`.
fn parse_comment_ref(comment_url: &str) -> Option<CommentRef> {
    let (head, id) = comment_url.rsplit_once("/comments/")?;
    if id.is_empty() {
        return None;
    }
    let kind = match head.rsplit('/').next()? {
        "pulls" => CommentKind::PullRequest,
        "issues" => CommentKind::Issue,
        "commits" => CommentKind::Commit,
        _ => return None,
    };
    Some(CommentRef {
        kind,
        id: id.to_owned(),
    })
}

/// The feed sends bodies with `\r\n` separators, and markdown renderers
/// swallow plain newlines into one paragraph. Apply the length cap to the
/// raw body, then normalize to `\n` and force a hard break (trailing
/// double space) onto every line that lacks one. The cap comes first so
/// the injected break spaces never eat into the visible text.
fn shape_body(raw: &str) -> String {
    ensure_hard_breaks(&truncate_chars(raw, MAX_MESSAGE_LENGTH))
}

fn ensure_hard_breaks(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n");
    let lines: Vec<&str> = unified.split('\n').collect();
    let last = lines.len().saturating_sub(1);
    let mut shaped = String::with_capacity(unified.len() + lines.len() * 2);
    for (index, line) in lines.iter().enumerate() {
        shaped.push_str(line);
        if index < last {
            if !line.ends_with("  ") {
                shaped.push_str("  ");
            }
            shaped.push('\n');
        }
    }
    shaped
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        text.chars().take(max).collect()
    } else {
        text.to_owned()
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
