use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::refresh::{RefreshController, ViewModel};

/// One complete, immutable result of `/api/v1/analyze`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generated_at: Option<DateTime<Utc>>,
    pub total_analyzed: u64,
    // Sorted by ascending rank, ranks unique.
    pub opportunities: Vec<Opportunity>,
    pub refresh_interval_seconds: u64,
    pub next_update: Option<String>,
    pub server_refreshing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub rank: u32,
    pub name: String,
    pub total_viewers: u64,
    pub channels: u64,
    pub avg_viewers_per_channel: f64,
    pub scores: OpportunityScores,
    pub recommendation: String,
    pub trend: String,
    pub box_art_url: Option<String>,
    pub purchase_links: PurchaseLinks,
}

/// Backend-computed scores, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OpportunityScores {
    pub discoverability: f64,
    pub viability: f64,
    pub engagement: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PurchaseLinks {
    pub steam: Option<String>,
    pub epic: Option<String>,
    pub free: bool,
}

/// Result of `/api/v1/status`. Drives warm-up polling only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub has_data: bool,
    pub data_age_seconds: Option<u64>,
    pub next_refresh_seconds: u64,
    pub is_server_refreshing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Data(Snapshot),
    /// The backend has no usable data yet; retry shortly.
    NotReady,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Status(StatusSnapshot),
    /// The status endpoint could not be reached or decoded.
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Initializing,
    WarmingUp,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCommand {
    PollStatus,
    FetchSnapshot { seq: u64, limit: u32 },
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum Delta {
    StatusPolled(PollOutcome),
    SnapshotFetched { seq: u64, outcome: FetchOutcome },
    Log(String),
}

pub struct AppState {
    pub controller: RefreshController,
    pub selected: usize,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl AppState {
    pub fn new(controller: RefreshController) -> Self {
        Self {
            controller,
            selected: 0,
            logs: VecDeque::new(),
            help_overlay: false,
        }
    }

    pub fn view(&self) -> ViewModel {
        self.controller.view()
    }

    pub fn start(&mut self) -> Vec<ProviderCommand> {
        let commands = self.controller.start();
        self.collect_notices();
        commands
    }

    pub fn tick(&mut self, now: Instant) -> Vec<ProviderCommand> {
        let commands = self.controller.tick(now);
        self.collect_notices();
        commands
    }

    pub fn retry(&mut self) -> Vec<ProviderCommand> {
        let commands = self.controller.retry();
        if commands.is_empty() {
            self.push_log("[INFO] Retry is only available after an error");
        }
        self.collect_notices();
        commands
    }

    pub fn opportunities(&self) -> &[Opportunity] {
        self.controller
            .snapshot()
            .map(|snapshot| snapshot.opportunities.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_opportunity(&self) -> Option<&Opportunity> {
        self.opportunities().get(self.selected)
    }

    pub fn select_next(&mut self) {
        let total = self.opportunities().len();
        if total == 0 {
            self.selected = 0;
            return;
        }
        self.selected = (self.selected + 1).min(total - 1);
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.opportunities().len().saturating_sub(1);
    }

    pub fn clamp_selection(&mut self) {
        let total = self.opportunities().len();
        if total == 0 {
            self.selected = 0;
        } else if self.selected >= total {
            self.selected = total - 1;
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    fn collect_notices(&mut self) {
        for notice in self.controller.take_notices() {
            self.push_log(notice);
        }
    }
}

/// Feeds one provider result into the controller and returns any follow-up
/// commands it issues.
pub fn apply_delta(state: &mut AppState, delta: Delta, now: Instant) -> Vec<ProviderCommand> {
    let commands = match delta {
        Delta::StatusPolled(outcome) => state.controller.on_status(outcome),
        Delta::SnapshotFetched { seq, outcome } => {
            let selected_rank = state.selected_opportunity().map(|o| o.rank);
            state.controller.on_fetch_result(seq, outcome, now);
            if let Some(rank) = selected_rank
                && let Some(idx) = state.opportunities().iter().position(|o| o.rank == rank)
            {
                state.selected = idx;
            }
            state.clamp_selection();
            Vec::new()
        }
        Delta::Log(line) => {
            state.push_log(line);
            Vec::new()
        }
    };
    state.collect_notices();
    commands
}

pub fn state_label(state: RefreshState) -> &'static str {
    match state {
        RefreshState::Initializing => "LOADING",
        RefreshState::WarmingUp => "WARMING UP",
        RefreshState::Ready => "LIVE",
        RefreshState::Error => "ERROR",
    }
}
