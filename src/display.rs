use std::{sync::mpsc, thread};

use notify_rust::{Notification, Timeout, Urgency};
use tracing::warn;

use crate::domain::{DismissFn, NotificationRecord, SubjectType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    Info,
    Warning,
    Error,
}

/// One display effect, ready for the external notification surface.
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub description: String,
    pub icon: Option<&'static str>,
    pub dismissable: bool,
    pub on_dismiss: Option<DismissFn>,
}

impl Alert {
    pub fn warning(message: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Warning,
            message: message.into(),
            description: description.into(),
            icon: None,
            dismissable: true,
            on_dismiss: None,
        }
    }

    pub fn error(message: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Error,
            message: message.into(),
            description: description.into(),
            icon: None,
            dismissable: true,
            on_dismiss: None,
        }
    }
}

/// Seam to the host notification widget. Production delivers to the
/// desktop; tests record.
pub trait DisplaySurface {
    fn show_alert(&self, alert: Alert);
}

/// Builds the display effect for one pending record.
pub fn alert_for(record: &NotificationRecord) -> Alert {
    Alert {
        kind: AlertKind::Info,
        message: format_message(record),
        description: format_description(record),
        icon: icon_for(record.subject_type),
        dismissable: true,
        on_dismiss: record.on_dismiss.clone(),
    }
}

fn format_message(record: &NotificationRecord) -> String {
    let display_name = record.subject_type.display_name();
    let subject = if record.subject_type == SubjectType::Commit {
        let short_sha: String = record.subject_id.chars().take(6).collect();
        format!("[{display_name} {short_sha}]({})", record.subject_url)
    } else {
        format!("[{display_name} #{}]({})", record.subject_id, record.subject_url)
    };
    let activity = match &record.user_login {
        Some(login) => format!("Activity by @{login} on {subject}"),
        None => format!("Activity on {subject}"),
    };
    format!(
        "![]({}&size=17) **[{}]**  \n{activity}",
        record.repo_owner_avatar_url, record.repo_full_name
    )
}

fn format_description(record: &NotificationRecord) -> String {
    match &record.body {
        // Bodies arrive already newline-shaped and truncated.
        Some(body) => format!("**{}**  \n{body}", record.title),
        None => format!("**{}**", record.title),
    }
}

fn icon_for(subject_type: SubjectType) -> Option<&'static str> {
    match subject_type {
        SubjectType::PullRequest => Some("git-pull-request"),
        SubjectType::Commit => Some("git-commit"),
        SubjectType::Issue => Some("issue-opened"),
        SubjectType::Other => None,
    }
}

/// Desktop notification delivery. `show_alert` returns once the alert has
/// actually been handed to the notification daemon, so a caller that exits
/// right afterwards (one-shot mode) cannot race the alert out of
/// existence. Only the wait for a dismissal stays behind, detached.
pub struct DesktopSurface;

impl DisplaySurface for DesktopSurface {
    fn show_alert(&self, alert: Alert) {
        spawn_delivery(move |delivered| deliver(alert, delivered));
    }
}

/// Runs one delivery on its own thread, returning as soon as the worker
/// signals that the delivery attempt has completed. Whatever the worker
/// does after signalling, such as blocking on a dismissal, keeps running
/// on the detached thread.
fn spawn_delivery<F>(work: F)
where
    F: FnOnce(&mpsc::Sender<()>) + Send + 'static,
{
    let (delivered, wait) = mpsc::channel();
    thread::spawn(move || work(&delivered));
    let _ = wait.recv();
}

fn deliver(alert: Alert, delivered: &mpsc::Sender<()>) {
    let mut notification = Notification::new();
    notification
        .appname("octowatch")
        .summary(&alert.message)
        .body(&alert.description)
        .urgency(match alert.kind {
            AlertKind::Info | AlertKind::Warning => Urgency::Normal,
            AlertKind::Error => Urgency::Critical,
        });
    if let Some(icon) = alert.icon {
        notification.icon(icon);
    }
    if alert.dismissable {
        notification.timeout(Timeout::Never);
    }

    match notification.show() {
        Ok(handle) => {
            let _ = delivered.send(());
            if let Some(on_dismiss) = alert.on_dismiss {
                // Blocks this (detached) thread until the notification
                // closes, then fires the capability once.
                handle.on_close(move || on_dismiss());
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to show desktop notification");
            let _ = delivered.send(());
        }
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject_type: SubjectType, subject_id: &str) -> NotificationRecord {
        NotificationRecord {
            id: "1".to_owned(),
            subject_type,
            title: "Fix flaky test".to_owned(),
            body: None,
            reason: "mention".to_owned(),
            repo_full_name: "acme/widgets".to_owned(),
            repo_owner_avatar_url: "https://avatars.example/acme?v=4".to_owned(),
            subject_id: subject_id.to_owned(),
            subject_url: "https://github.com/acme/widgets/pull/88".to_owned(),
            user_login: None,
            on_dismiss: None,
        }
    }

    #[test]
    fn message_links_numeric_subjects_with_a_hash() {
        let message = format_message(&record(SubjectType::PullRequest, "88"));
        assert!(message.contains("[PR #88](https://github.com/acme/widgets/pull/88)"));
        assert!(message.starts_with("![](https://avatars.example/acme?v=4&size=17) **[acme/widgets]**"));
    }

    #[test]
    fn message_shortens_commit_subjects_to_six_chars() {
        let mut commit = record(SubjectType::Commit, "f00dbabef00dbabe");
        commit.subject_url = "https://github.com/acme/widgets/commit/f00dbabef00dbabe".to_owned();
        let message = format_message(&commit);
        assert!(message.contains("[Commit f00dba]("));
    }

    #[test]
    fn message_credits_the_comment_author_when_known() {
        let mut with_author = record(SubjectType::Issue, "7");
        with_author.user_login = Some("octocat".to_owned());
        assert!(format_message(&with_author).contains("Activity by @octocat on"));
        assert!(format_message(&record(SubjectType::Issue, "7")).contains("Activity on"));
    }

    #[test]
    fn description_is_bold_title_plus_body() {
        let mut with_body = record(SubjectType::Issue, "7");
        with_body.body = Some("line one  \nline two".to_owned());
        assert_eq!(
            format_description(&with_body),
            "**Fix flaky test**  \nline one  \nline two"
        );
        assert_eq!(
            format_description(&record(SubjectType::Issue, "7")),
            "**Fix flaky test**"
        );
    }

    #[test]
    fn delivery_has_completed_by_the_time_spawn_delivery_returns() {
        use std::sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        };

        let shown = Arc::new(AtomicBool::new(false));
        let marker = Arc::clone(&shown);
        spawn_delivery(move |delivered| {
            marker.store(true, Ordering::SeqCst);
            let _ = delivered.send(());
        });
        assert!(shown.load(Ordering::SeqCst));
    }

    #[test]
    fn spawn_delivery_does_not_wait_for_a_dismissal_watch() {
        // The worker signals delivery and then parks forever, like a
        // thread waiting for the user to close a notification. The call
        // must still return; hanging here fails the test run.
        spawn_delivery(|delivered| {
            let _ = delivered.send(());
            let (_keep_open, block) = mpsc::channel::<()>();
            let _ = block.recv();
        });
    }

    #[test]
    fn icons_map_per_subject_type() {
        assert_eq!(icon_for(SubjectType::PullRequest), Some("git-pull-request"));
        assert_eq!(icon_for(SubjectType::Issue), Some("issue-opened"));
        assert_eq!(icon_for(SubjectType::Commit), Some("git-commit"));
        assert_eq!(icon_for(SubjectType::Other), None);
    }
}
