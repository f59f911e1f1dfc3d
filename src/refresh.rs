//! Freshness and warm-up state machine.
//!
//! The controller is driven from one thread: the UI loop calls [`RefreshController::tick`]
//! on every iteration and forwards provider results through
//! [`RefreshController::on_fetch_result`] and [`RefreshController::on_status`].
//! It never performs I/O itself; it returns [`ProviderCommand`]s for the
//! provider thread to execute.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::countdown::CountdownClock;
use crate::state::{FetchOutcome, PollOutcome, ProviderCommand, RefreshState, Snapshot};
use crate::timers::IntervalTimer;

pub const DEFAULT_WARMUP_POLL: Duration = Duration::from_secs(3);
pub const DEFAULT_DRIFT_INTERVAL: Duration = Duration::from_secs(60);

pub const MSG_SERVER_REFRESHING: &str = "Fetching stream data from Twitch API...";
pub const MSG_WAITING_FOR_DATA: &str = "Waiting for initial data fetch...";
pub const MSG_CONNECTING: &str = "Connecting to server...";
pub const MSG_LOADING_DATA: &str = "Data available, loading...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub limit: u32,
    pub warmup_poll: Duration,
    pub drift_interval: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            limit: 25,
            warmup_poll: DEFAULT_WARMUP_POLL,
            drift_interval: DEFAULT_DRIFT_INTERVAL,
        }
    }
}

/// What caused a snapshot request. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Startup,
    Retry,
    CountdownExpired,
    DriftCorrection,
    StatusHasData,
}

fn trigger_label(trigger: Trigger) -> &'static str {
    match trigger {
        Trigger::Startup => "startup",
        Trigger::Retry => "retry",
        Trigger::CountdownExpired => "countdown",
        Trigger::DriftCorrection => "drift correction",
        Trigger::StatusHasData => "status reported data",
    }
}

/// Read-only projection handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub state: RefreshState,
    pub snapshot: Option<Arc<Snapshot>>,
    pub countdown_seconds: u64,
    pub warmup_message: Option<String>,
    pub error_message: Option<String>,
    pub loading: bool,
}

#[derive(Debug)]
pub struct RefreshController {
    settings: RefreshSettings,
    state: RefreshState,
    snapshot: Option<Arc<Snapshot>>,
    countdown: CountdownClock,
    warmup_timer: IntervalTimer,
    drift_timer: IntervalTimer,
    warmup_message: Option<String>,
    error_message: Option<String>,
    fetch_in_flight: Option<u64>,
    poll_in_flight: bool,
    next_seq: u64,
    started: bool,
    torn_down: bool,
    notices: Vec<String>,
}

impl RefreshController {
    pub fn new(settings: RefreshSettings) -> Self {
        Self {
            settings,
            state: RefreshState::Initializing,
            snapshot: None,
            countdown: CountdownClock::new(),
            warmup_timer: IntervalTimer::new(settings.warmup_poll),
            drift_timer: IntervalTimer::new(settings.drift_interval),
            warmup_message: None,
            error_message: None,
            fetch_in_flight: None,
            poll_in_flight: false,
            next_seq: 0,
            started: false,
            torn_down: false,
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.snapshot.as_ref()
    }

    pub fn countdown_seconds(&self) -> u64 {
        self.countdown.remaining()
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.fetch_in_flight.is_some()
    }

    pub fn poll_in_flight(&self) -> bool {
        self.poll_in_flight
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// True while any timer could still produce work.
    pub fn has_active_timers(&self) -> bool {
        self.countdown.is_running() || self.warmup_timer.is_running() || self.drift_timer.is_running()
    }

    pub fn view(&self) -> ViewModel {
        ViewModel {
            state: self.state,
            snapshot: self.snapshot.clone(),
            countdown_seconds: self.countdown.remaining(),
            warmup_message: self.warmup_message.clone(),
            error_message: self.error_message.clone(),
            loading: self.fetch_in_flight.is_some(),
        }
    }

    /// Drains the log lines recorded since the previous call.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Issues the initial snapshot request. Calling it twice is a no-op.
    pub fn start(&mut self) -> Vec<ProviderCommand> {
        if self.torn_down || self.started {
            return Vec::new();
        }
        self.started = true;
        self.state = RefreshState::Initializing;
        self.request_fetch(Trigger::Startup).into_iter().collect()
    }

    /// User-triggered retry. Only honoured from `Error`; re-enters `Initializing`
    /// while keeping the last good snapshot.
    pub fn retry(&mut self) -> Vec<ProviderCommand> {
        if self.torn_down || self.state != RefreshState::Error {
            return Vec::new();
        }
        self.state = RefreshState::Initializing;
        self.error_message = None;
        self.notices.push("[INFO] Retrying".to_string());
        self.request_fetch(Trigger::Retry).into_iter().collect()
    }

    /// Advances every timer to `now` and returns the requests that became due.
    pub fn tick(&mut self, now: Instant) -> Vec<ProviderCommand> {
        if self.torn_down {
            return Vec::new();
        }
        let mut commands = Vec::new();
        match self.state {
            RefreshState::Ready => {
                self.countdown.tick(now);
                let expired = self.countdown.take_expiry();
                let drift = self.drift_timer.fire(now) > 0;
                // Both triggers collapse into one request.
                let trigger = match (expired, drift) {
                    (true, _) => Some(Trigger::CountdownExpired),
                    (false, true) => Some(Trigger::DriftCorrection),
                    (false, false) => None,
                };
                if let Some(trigger) = trigger
                    && let Some(cmd) = self.request_fetch(trigger)
                {
                    commands.push(cmd);
                }
            }
            RefreshState::WarmingUp => {
                // No status checks while the snapshot requested by the last one is pending.
                if self.warmup_timer.fire(now) > 0
                    && !self.poll_in_flight
                    && self.fetch_in_flight.is_none()
                {
                    self.poll_in_flight = true;
                    commands.push(ProviderCommand::PollStatus);
                }
            }
            RefreshState::Initializing | RefreshState::Error => {}
        }
        commands
    }

    pub fn on_fetch_result(&mut self, seq: u64, outcome: FetchOutcome, now: Instant) {
        if self.torn_down {
            return;
        }
        if self.fetch_in_flight != Some(seq) {
            self.notices
                .push(format!("[WARN] Discarded stale snapshot response #{seq}"));
            return;
        }
        self.fetch_in_flight = None;

        match outcome {
            FetchOutcome::Data(snapshot) => self.accept_snapshot(snapshot, now),
            FetchOutcome::NotReady => {
                if self.state != RefreshState::WarmingUp {
                    self.enter_warmup(now);
                }
            }
            FetchOutcome::Failure(reason) => {
                if self.state == RefreshState::WarmingUp {
                    self.notices
                        .push(format!("[WARN] Snapshot fetch failed during warm-up: {reason}"));
                } else {
                    self.enter_error(reason);
                }
            }
        }
    }

    pub fn on_status(&mut self, outcome: PollOutcome) -> Vec<ProviderCommand> {
        self.poll_in_flight = false;
        if self.torn_down || self.state != RefreshState::WarmingUp {
            return Vec::new();
        }
        match outcome {
            PollOutcome::Status(status) if status.has_data => {
                self.warmup_message = Some(MSG_LOADING_DATA.to_string());
                if self.fetch_in_flight.is_some() {
                    return Vec::new();
                }
                self.request_fetch(Trigger::StatusHasData).into_iter().collect()
            }
            PollOutcome::Status(status) if status.is_server_refreshing => {
                self.warmup_message = Some(MSG_SERVER_REFRESHING.to_string());
                Vec::new()
            }
            PollOutcome::Status(_) => {
                self.warmup_message = Some(MSG_WAITING_FOR_DATA.to_string());
                Vec::new()
            }
            PollOutcome::Unavailable(reason) => {
                if self.warmup_message.as_deref() != Some(MSG_CONNECTING) {
                    self.notices
                        .push(format!("[WARN] Status check failed: {reason}"));
                }
                self.warmup_message = Some(MSG_CONNECTING.to_string());
                Vec::new()
            }
        }
    }

    /// Stops every timer. Afterwards the controller ignores ticks and results.
    pub fn teardown(&mut self) -> Vec<ProviderCommand> {
        if self.torn_down {
            return Vec::new();
        }
        self.torn_down = true;
        self.countdown.stop();
        self.warmup_timer.stop();
        self.drift_timer.stop();
        self.fetch_in_flight = None;
        self.poll_in_flight = false;
        vec![ProviderCommand::Shutdown]
    }

    fn request_fetch(&mut self, trigger: Trigger) -> Option<ProviderCommand> {
        if let Some(seq) = self.fetch_in_flight {
            self.notices.push(format!(
                "[INFO] Refresh #{seq} still in flight; {} trigger skipped",
                trigger_label(trigger)
            ));
            return None;
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        self.fetch_in_flight = Some(seq);
        if trigger != Trigger::Startup {
            self.notices.push(format!(
                "[INFO] Refresh #{seq} requested ({})",
                trigger_label(trigger)
            ));
        }
        Some(ProviderCommand::FetchSnapshot {
            seq,
            limit: self.settings.limit,
        })
    }

    fn accept_snapshot(&mut self, snapshot: Snapshot, now: Instant) {
        let interval = snapshot.refresh_interval_seconds;
        let count = snapshot.opportunities.len();
        self.snapshot = Some(Arc::new(snapshot));
        self.countdown.reset(interval, now);
        self.warmup_timer.stop();
        self.poll_in_flight = false;
        if !self.drift_timer.is_running() {
            self.drift_timer.start(now);
        }
        if self.state != RefreshState::Ready {
            self.notices.push(format!(
                "[INFO] Data ready: {count} opportunities, next refresh in {interval}s"
            ));
        }
        self.state = RefreshState::Ready;
        self.warmup_message = None;
        self.error_message = None;
    }

    fn enter_warmup(&mut self, now: Instant) {
        self.state = RefreshState::WarmingUp;
        self.countdown.stop();
        self.drift_timer.stop();
        self.error_message = None;
        self.warmup_message = Some(MSG_WAITING_FOR_DATA.to_string());
        self.warmup_timer.start(now);
        self.notices
            .push("[INFO] Server is warming up; polling status".to_string());
    }

    fn enter_error(&mut self, reason: String) {
        self.state = RefreshState::Error;
        self.countdown.stop();
        self.drift_timer.stop();
        self.warmup_timer.stop();
        self.warmup_message = None;
        self.notices.push(format!("[WARN] Refresh failed: {reason}"));
        self.error_message = Some(reason);
    }
}
