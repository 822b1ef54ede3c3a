use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::Rc,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::display::{self, DisplaySurface};
use crate::domain::NotificationRecord;
use crate::state::{Action, Store, SubscriptionId};

/// Minimum spacing between two display effects. The notification surface
/// swallows alerts triggered too close together, so a burst is spread out
/// one step apart.
pub const DISPLAY_SPACING: Duration = Duration::from_millis(750);

struct QueuedAlert {
    due: Instant,
    record: NotificationRecord,
}

/// Drains the pending-notifications slice of state into paced display
/// effects. Driven by an explicit `now` so tests run on a synthetic
/// timeline.
pub struct DisplayScheduler {
    spacing: Duration,
    queue: VecDeque<QueuedAlert>,
}

impl DisplayScheduler {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            queue: VecDeque::new(),
        }
    }

    /// Subscribes the scheduler to a store. On every transition with a
    /// non-empty pending slice, the batch is queued and then immediately
    /// cleared from state with a nested dispatch. The scheduler borrow is
    /// released before that dispatch, so the re-entrant pass through this
    /// closure sees an empty slice and returns without borrowing again.
    pub fn attach(scheduler: &Rc<RefCell<Self>>, store: &Store) -> SubscriptionId {
        let hook = Rc::clone(scheduler);
        store.subscribe(move |store| {
            let notifications = store.state().notifications;
            if notifications.is_empty() {
                return;
            }
            let ids = hook.borrow_mut().queue_batch(notifications, Instant::now());
            store.dispatch(Action::NotificationsDisplayed { ids });
        })
    }

    /// Schedules item `k` of the batch at delay `k × spacing` and returns
    /// the batch's ids so the caller can clear them from state. Optimistic
    /// hand-off: the queue owns these records now. If the feed re-emits
    /// one of the ids later, it re-enters state as a fresh pending record.
    pub fn queue_batch(&mut self, batch: Vec<NotificationRecord>, now: Instant) -> Vec<String> {
        let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
        debug!(count = ids.len(), "scheduling notification batch");
        for (index, record) in batch.into_iter().enumerate() {
            self.queue.push_back(QueuedAlert {
                due: now + self.spacing * index as u32,
                record,
            });
        }
        ids
    }

    /// Fires every queued effect whose time has come. One effect's failure
    /// is the surface's problem; the next one still fires. Batches may
    /// interleave, but each batch keeps its internal order.
    pub fn fire_due(&mut self, now: Instant, surface: &dyn DisplaySurface) {
        let mut index = 0;
        while index < self.queue.len() {
            if self.queue[index].due <= now {
                if let Some(queued) = self.queue.remove(index) {
                    surface.show_alert(display::alert_for(&queued.record));
                }
            } else {
                index += 1;
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Alert;
    use crate::domain::{ApplicationState, SubjectType};

    struct RecordingSurface {
        shown: RefCell<Vec<Alert>>,
    }

    impl RecordingSurface {
        fn new() -> Self {
            Self {
                shown: RefCell::new(Vec::new()),
            }
        }

        fn shown_count(&self) -> usize {
            self.shown.borrow().len()
        }
    }

    impl DisplaySurface for RecordingSurface {
        fn show_alert(&self, alert: Alert) {
            self.shown.borrow_mut().push(alert);
        }
    }

    fn record(id: &str) -> NotificationRecord {
        NotificationRecord {
            id: id.to_owned(),
            subject_type: SubjectType::Issue,
            title: format!("title-{id}"),
            body: None,
            reason: "subscribed".to_owned(),
            repo_full_name: "acme/widgets".to_owned(),
            repo_owner_avatar_url: "https://avatars.example/acme".to_owned(),
            subject_id: id.to_owned(),
            subject_url: format!("https://github.com/acme/widgets/issues/{id}"),
            user_login: None,
            on_dismiss: None,
        }
    }

    fn records(ids: &[&str]) -> Vec<NotificationRecord> {
        ids.iter().map(|id| record(id)).collect()
    }

    #[test]
    fn attached_scheduler_drains_the_batch_on_dispatch() {
        let store = Store::new(ApplicationState::default());
        let scheduler = Rc::new(RefCell::new(DisplayScheduler::new(DISPLAY_SPACING)));
        DisplayScheduler::attach(&scheduler, &store);

        // The nested clearing dispatch re-enters the subscriber closure
        // synchronously; it must not end up borrowing the scheduler twice.
        store.dispatch(Action::NotificationsAdded {
            records: records(&["a", "b", "c"]),
            check_time: 1000,
        });

        assert!(store.state().notifications.is_empty());
        assert_eq!(scheduler.borrow().queue.len(), 3);
    }

    #[test]
    fn attached_scheduler_handles_consecutive_batches() {
        let store = Store::new(ApplicationState::default());
        let scheduler = Rc::new(RefCell::new(DisplayScheduler::new(DISPLAY_SPACING)));
        DisplayScheduler::attach(&scheduler, &store);

        store.dispatch(Action::NotificationsAdded {
            records: records(&["a"]),
            check_time: 1000,
        });
        store.dispatch(Action::NotificationsAdded {
            records: records(&["b", "c"]),
            check_time: 2000,
        });

        assert!(store.state().notifications.is_empty());
        assert_eq!(scheduler.borrow().queue.len(), 3);
    }

    #[test]
    fn empty_batch_leaves_the_scheduler_idle() {
        let store = Store::new(ApplicationState::default());
        let scheduler = Rc::new(RefCell::new(DisplayScheduler::new(DISPLAY_SPACING)));
        DisplayScheduler::attach(&scheduler, &store);

        store.dispatch(Action::NotificationsAdded {
            records: Vec::new(),
            check_time: 1000,
        });

        assert!(scheduler.borrow().is_idle());
    }

    #[test]
    fn queue_batch_returns_the_batch_ids_in_order() {
        let mut scheduler = DisplayScheduler::new(DISPLAY_SPACING);
        let ids = scheduler.queue_batch(records(&["a", "b"]), Instant::now());
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn effects_are_spaced_one_step_apart() {
        let mut scheduler = DisplayScheduler::new(DISPLAY_SPACING);
        let origin = Instant::now();

        scheduler.queue_batch(records(&["a", "b", "c"]), origin);

        let delays: Vec<Duration> = scheduler
            .queue
            .iter()
            .map(|queued| queued.due - origin)
            .collect();
        assert_eq!(
            delays,
            [
                Duration::ZERO,
                Duration::from_millis(750),
                Duration::from_millis(1500),
            ]
        );
    }

    #[test]
    fn fire_due_respects_the_timeline() {
        let mut scheduler = DisplayScheduler::new(DISPLAY_SPACING);
        let surface = RecordingSurface::new();
        let origin = Instant::now();

        scheduler.queue_batch(records(&["a", "b", "c"]), origin);

        scheduler.fire_due(origin, &surface);
        assert_eq!(surface.shown_count(), 1);

        scheduler.fire_due(origin + Duration::from_millis(749), &surface);
        assert_eq!(surface.shown_count(), 1);

        scheduler.fire_due(origin + Duration::from_millis(750), &surface);
        assert_eq!(surface.shown_count(), 2);

        scheduler.fire_due(origin + Duration::from_millis(1500), &surface);
        assert_eq!(surface.shown_count(), 3);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn fired_effects_keep_batch_order() {
        let mut scheduler = DisplayScheduler::new(DISPLAY_SPACING);
        let surface = RecordingSurface::new();
        let origin = Instant::now();

        scheduler.queue_batch(records(&["a", "b"]), origin);
        scheduler.fire_due(origin + Duration::from_secs(10), &surface);

        let shown = surface.shown.borrow();
        assert!(shown[0].description.contains("title-a"));
        assert!(shown[1].description.contains("title-b"));
    }
}
