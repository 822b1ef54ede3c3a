use std::{
    cell::RefCell,
    rc::Rc,
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::{
    config::Settings,
    display::{Alert, DisplaySurface},
    domain::{ApplicationState, NotificationRecord},
    fetch::{self, FetchParams},
    github::{self, FetchError},
    scheduler::{DISPLAY_SPACING, DisplayScheduler},
    state::{Action, Store},
    storage::StateStore,
};

/// Cooperative tick cadence of the main loop; bounds display-pacing
/// granularity, not network traffic.
const TICK: Duration = Duration::from_millis(250);

/// How often the level-triggered poll timer re-evaluates whether enough
/// wall-clock time has passed since the last completed cycle.
const POLL_RECHECK_INTERVAL: Duration = Duration::from_secs(30);

const TOKEN_PROMPT_TITLE: &str = "GitHub Notifications";
const TOKEN_PROMPT_BODY: &str = "You don't seem to be set up yet. Generate a personal access \
token with the notifications scope at https://github.com/settings/tokens/new, then either put \
it in ~/.octowatch/config.json as \"personal_access_token\" or export it as GITHUB_TOKEN.";

/// The explicit context object owning every moving part: store, display
/// scheduler, surface, HTTP client, settings, and in-flight fetch jobs.
/// Constructed once at startup; there is no ambient global state.
pub struct App {
    store: Rc<Store>,
    scheduler: Rc<RefCell<DisplayScheduler>>,
    surface: Rc<dyn DisplaySurface>,
    settings: Settings,
    client: Client,
    pending: Vec<PendingFetch>,
    poll_gate: PollGate,
}

impl App {
    pub fn new(
        settings: Settings,
        initial_state: ApplicationState,
        state_store: StateStore,
        surface: Rc<dyn DisplaySurface>,
    ) -> Result<Self, FetchError> {
        let client = github::build_client()?;
        let store = Rc::new(Store::new(initial_state));
        let scheduler = Rc::new(RefCell::new(DisplayScheduler::new(DISPLAY_SPACING)));

        DisplayScheduler::attach(&scheduler, &store);

        // Persist after every transition so a crash resumes from the most
        // recent snapshot without lifecycle hooks.
        store.subscribe(move |store| {
            if let Err(err) = state_store.save(&store.state()) {
                warn!(error = %err, "failed to persist state snapshot");
            }
        });

        Ok(Self {
            store,
            scheduler,
            surface,
            settings,
            client,
            pending: Vec::new(),
            poll_gate: PollGate::new(POLL_RECHECK_INTERVAL),
        })
    }

    /// Daemon mode: fetch immediately, then keep ticking forever.
    pub fn run(&mut self) {
        self.fetch();
        loop {
            self.tick(Instant::now());
            thread::sleep(TICK);
        }
    }

    /// One-shot mode: run a single fetch cycle, drain every scheduled
    /// display effect, then return. With `reset_first` the state is wiped
    /// beforehand, so the cycle refetches all unread notifications.
    pub fn run_once(&mut self, reset_first: bool) {
        if reset_first {
            self.store.dispatch(Action::ResetState);
        }
        self.fetch();
        loop {
            self.tick(Instant::now());
            if self.pending.is_empty() && self.scheduler.borrow().is_idle() {
                return;
            }
            thread::sleep(TICK);
        }
    }

    fn tick(&mut self, now: Instant) {
        self.poll_pending();
        self.maybe_poll();
        self.scheduler.borrow_mut().fire_due(now, self.surface.as_ref());
    }

    /// Starts one fetch cycle on a worker thread, or runs the one-time
    /// token setup prompt when no token resolves. The cycle start time is
    /// captured here, before the remote call, so events arriving during a
    /// slow cycle are not lost to the next `since` window.
    pub fn fetch(&mut self) {
        let Some(token) = self.settings.resolve_token() else {
            if self.store.state().has_prompted_for_token {
                return;
            }
            self.surface
                .show_alert(Alert::warning(TOKEN_PROMPT_TITLE, TOKEN_PROMPT_BODY));
            self.store.dispatch(Action::TokenNotificationShown);
            return;
        };

        let check_time = Utc::now().timestamp_millis();
        let params = FetchParams {
            token,
            since: fetch::since_timestamp(self.store.state().last_check_time),
            participating_only: self.settings.show_only_direct_participation,
            mark_read_on_dismiss: self.settings.mark_read_on_dismiss,
        };
        info!(since = %params.since, "starting fetch cycle");
        self.pending
            .push(PendingFetch::spawn(self.client.clone(), params, check_time));
    }

    /// Collects finished fetch cycles. Success and failure both dispatch
    /// exactly one `NotificationsAdded`, so `last_check_time` always
    /// advances and a failing feed cannot cause refetch storms.
    fn poll_pending(&mut self) {
        let mut finished = Vec::new();
        self.pending.retain(|job| match job.try_take() {
            None => true,
            Some(result) => {
                finished.push((job.check_time, result));
                false
            }
        });

        for (check_time, result) in finished {
            match result {
                Ok(records) => {
                    info!(count = records.len(), "fetch cycle completed");
                    self.store
                        .dispatch(Action::NotificationsAdded { records, check_time });
                }
                Err(err) => {
                    warn!(error = %err, "fetch cycle failed");
                    self.store.dispatch(Action::NotificationsAdded {
                        records: Vec::new(),
                        check_time,
                    });
                    self.surface.show_alert(Alert::error(
                        "Error communicating with GitHub",
                        err.user_message(),
                    ));
                }
            }
        }
    }

    /// Level-triggered poll timer: every recheck interval, fetch iff the
    /// configured poll interval has elapsed since the last completed
    /// cycle. An overlapping trigger while a cycle is still in flight is
    /// tolerated; the reducer's dedupe makes concurrent completions safe.
    fn maybe_poll(&mut self) {
        if !self.poll_gate.should_trigger() {
            return;
        }
        self.poll_gate.mark_triggered();

        let elapsed = Utc::now().timestamp_millis() - self.store.state().last_check_time;
        let interval_ms = self.settings.poll_interval_minutes.saturating_mul(60_000) as i64;
        if elapsed >= interval_ms {
            self.fetch();
        }
    }
}

// -----------------------------------------------------------------------------
// Background fetch jobs
// -----------------------------------------------------------------------------

/// One in-flight fetch cycle on its own worker thread. Never cancelled:
/// once started, it runs to a success or error outcome.
struct PendingFetch {
    check_time: i64,
    receiver: Receiver<Result<Vec<NotificationRecord>, FetchError>>,
}

impl PendingFetch {
    fn spawn(client: Client, params: FetchParams, check_time: i64) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(fetch::run_cycle(&client, &params));
        });
        Self {
            check_time,
            receiver: rx,
        }
    }

    fn try_take(&self) -> Option<Result<Vec<NotificationRecord>, FetchError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(FetchError::WorkerGone)),
        }
    }
}

// -----------------------------------------------------------------------------
// Poll timing
// -----------------------------------------------------------------------------

/// Limits how often the poll condition is re-evaluated. Counting starts at
/// construction, so the explicit startup fetch is not doubled by the timer
/// firing on the first tick.
struct PollGate {
    interval: Duration,
    last_run: Instant,
}

impl PollGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: Instant::now(),
        }
    }

    fn should_trigger(&self) -> bool {
        self.last_run.elapsed() >= self.interval
    }

    fn mark_triggered(&mut self) {
        self.last_run = Instant::now();
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
