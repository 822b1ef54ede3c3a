use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
};

use crate::domain::{ApplicationState, NotificationRecord};

/// Closed set of state transitions. Every dispatch runs exactly one of
/// these through [`reduce`].
#[derive(Debug)]
pub enum Action {
    /// Outcome of one completed fetch cycle. Dispatched even for an empty
    /// or failed cycle so `last_check_time` always advances.
    NotificationsAdded {
        records: Vec<NotificationRecord>,
        check_time: i64,
    },
    /// The display scheduler has taken responsibility for these ids.
    NotificationsDisplayed { ids: Vec<String> },
    /// Back to the pristine initial state.
    ResetState,
    /// The one-time token setup prompt was shown.
    TokenNotificationShown,
}

/// Pure transition function. No I/O, no clocks, fully deterministic.
pub fn reduce(state: ApplicationState, action: Action) -> ApplicationState {
    match action {
        Action::NotificationsAdded {
            records,
            check_time,
        } => {
            // First occurrence wins: records already pending keep their
            // fields (and any resolved comment body) over a re-fetched
            // duplicate, and arrival order is preserved.
            let mut seen = HashSet::new();
            let mut merged = Vec::with_capacity(state.notifications.len() + records.len());
            for record in state.notifications.into_iter().chain(records) {
                if seen.insert(record.id.clone()) {
                    merged.push(record);
                }
            }
            ApplicationState {
                last_check_time: check_time,
                notifications: merged,
                ..state
            }
        }
        Action::NotificationsDisplayed { ids } => {
            let drained: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let mut state = state;
            state
                .notifications
                .retain(|record| !drained.contains(record.id.as_str()));
            state
        }
        Action::ResetState => ApplicationState::default(),
        Action::TokenNotificationShown => ApplicationState {
            has_prompted_for_token: true,
            ..state
        },
    }
}

type SubscriberFn = Rc<dyn Fn(&Store)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Holds the one [`ApplicationState`] value and notifies subscribers
/// synchronously on every transition. Single-threaded by construction;
/// worker threads hand their results to the owning thread instead of
/// touching the store.
pub struct Store {
    state: RefCell<ApplicationState>,
    subscribers: RefCell<Vec<(SubscriptionId, SubscriberFn)>>,
    next_id: Cell<u64>,
}

impl Store {
    pub fn new(initial: ApplicationState) -> Self {
        Self {
            state: RefCell::new(initial),
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Current immutable snapshot.
    pub fn state(&self) -> ApplicationState {
        self.state.borrow().clone()
    }

    /// Applies the reducer, replaces the state, then notifies every current
    /// subscriber. A subscriber may dispatch again; the nested dispatch
    /// completes fully before the outer one resumes its remaining
    /// subscribers. The subscriber list is snapshotted per pass, so
    /// subscribing or unsubscribing from inside a callback is safe.
    pub fn dispatch(&self, action: Action) {
        let next = reduce(self.state.borrow().clone(), action);
        *self.state.borrow_mut() = next;

        let listeners: Vec<SubscriberFn> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in listeners {
            callback(self);
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&Store) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
