use std::time::{Duration, Instant};

use streamscout_terminal::fake_feed::FakeBackend;
use streamscout_terminal::provider::{SnapshotFetcher, StatusPoller};
use streamscout_terminal::refresh::{MSG_LOADING_DATA, RefreshController, RefreshSettings};
use streamscout_terminal::state::{
    AppState, Delta, FetchOutcome, Opportunity, OpportunityScores, PollOutcome, ProviderCommand,
    PurchaseLinks, RefreshState, Snapshot, StatusSnapshot, apply_delta, state_label,
};

fn opportunity(rank: u32, name: &str) -> Opportunity {
    Opportunity {
        rank,
        name: name.to_string(),
        total_viewers: 500,
        channels: 5,
        avg_viewers_per_channel: 100.0,
        scores: OpportunityScores::default(),
        recommendation: String::new(),
        trend: "stable".to_string(),
        box_art_url: None,
        purchase_links: PurchaseLinks::default(),
    }
}

fn snapshot(entries: &[(u32, &str)]) -> Snapshot {
    Snapshot {
        generated_at: None,
        total_analyzed: entries.len() as u64,
        opportunities: entries
            .iter()
            .map(|(rank, name)| opportunity(*rank, name))
            .collect(),
        refresh_interval_seconds: 120,
        next_update: None,
        server_refreshing: false,
    }
}

fn first_fetch(commands: &[ProviderCommand]) -> u64 {
    commands
        .iter()
        .find_map(|cmd| match cmd {
            ProviderCommand::FetchSnapshot { seq, .. } => Some(*seq),
            _ => None,
        })
        .expect("a snapshot request")
}

fn started_state() -> (AppState, u64) {
    let mut state = AppState::new(RefreshController::new(RefreshSettings::default()));
    let seq = first_fetch(&state.start());
    (state, seq)
}

#[test]
fn snapshot_delta_populates_table() {
    let now = Instant::now();
    let (mut state, seq) = started_state();
    let outcome = FetchOutcome::Data(snapshot(&[(1, "Balatro"), (2, "Dredge")]));
    let commands = apply_delta(&mut state, Delta::SnapshotFetched { seq, outcome }, now);
    assert!(commands.is_empty());
    assert_eq!(state.view().state, RefreshState::Ready);
    assert_eq!(state.opportunities().len(), 2);
    assert_eq!(
        state.selected_opportunity().map(|o| o.name.as_str()),
        Some("Balatro")
    );
    assert!(state.logs.iter().any(|line| line.contains("Data ready")));
}

#[test]
fn refresh_keeps_selection_on_same_rank() {
    let now = Instant::now();
    let (mut state, seq) = started_state();
    let first = FetchOutcome::Data(snapshot(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")]));
    apply_delta(&mut state, Delta::SnapshotFetched { seq, outcome: first }, now);
    state.select_next();
    state.select_next();
    assert_eq!(state.selected_opportunity().map(|o| o.rank), Some(3));

    let seq = first_fetch(&state.tick(now + Duration::from_secs(120)));
    // Rank 1 disappeared, so rank 3 moved up one row.
    let second = FetchOutcome::Data(snapshot(&[(2, "B"), (3, "X"), (4, "D")]));
    apply_delta(
        &mut state,
        Delta::SnapshotFetched { seq, outcome: second },
        now + Duration::from_secs(121),
    );
    assert_eq!(state.selected, 1);
    assert_eq!(state.selected_opportunity().map(|o| o.name.as_str()), Some("X"));
}

#[test]
fn shrinking_snapshot_clamps_selection() {
    let now = Instant::now();
    let (mut state, seq) = started_state();
    let first = FetchOutcome::Data(snapshot(&[(1, "A"), (2, "B"), (3, "C")]));
    apply_delta(&mut state, Delta::SnapshotFetched { seq, outcome: first }, now);
    state.select_last();
    assert_eq!(state.selected, 2);

    let seq = first_fetch(&state.tick(now + Duration::from_secs(120)));
    let second = FetchOutcome::Data(snapshot(&[(10, "Z")]));
    apply_delta(
        &mut state,
        Delta::SnapshotFetched { seq, outcome: second },
        now + Duration::from_secs(121),
    );
    assert_eq!(state.selected, 0);

    state.select_next();
    assert_eq!(state.selected, 0);
}

#[test]
fn status_delta_with_data_returns_fetch_command() {
    let now = Instant::now();
    let (mut state, seq) = started_state();
    apply_delta(
        &mut state,
        Delta::SnapshotFetched { seq, outcome: FetchOutcome::NotReady },
        now,
    );
    assert_eq!(state.view().state, RefreshState::WarmingUp);
    assert_eq!(
        state.tick(now + Duration::from_secs(3)),
        vec![ProviderCommand::PollStatus]
    );

    let status = PollOutcome::Status(StatusSnapshot {
        has_data: true,
        ..StatusSnapshot::default()
    });
    let commands = apply_delta(&mut state, Delta::StatusPolled(status), now);
    first_fetch(&commands);
    assert_eq!(state.view().warmup_message.as_deref(), Some(MSG_LOADING_DATA));
}

#[test]
fn log_delta_goes_to_console() {
    let (mut state, _) = started_state();
    apply_delta(&mut state, Delta::Log("[INFO] hello".to_string()), Instant::now());
    assert_eq!(state.logs.back().map(String::as_str), Some("[INFO] hello"));
}

#[test]
fn console_is_bounded() {
    let (mut state, _) = started_state();
    for idx in 0..250 {
        state.push_log(format!("line {idx}"));
    }
    assert_eq!(state.logs.len(), 200);
    assert_eq!(state.logs.front().map(String::as_str), Some("line 50"));
}

#[test]
fn retry_outside_error_is_logged_and_ignored() {
    let now = Instant::now();
    let (mut state, seq) = started_state();
    apply_delta(
        &mut state,
        Delta::SnapshotFetched { seq, outcome: FetchOutcome::Data(snapshot(&[(1, "A")])) },
        now,
    );
    assert!(state.retry().is_empty());
    assert!(
        state
            .logs
            .iter()
            .any(|line| line.contains("only available after an error"))
    );
}

#[test]
fn retry_after_error_requests_again() {
    let now = Instant::now();
    let (mut state, seq) = started_state();
    apply_delta(
        &mut state,
        Delta::SnapshotFetched {
            seq,
            outcome: FetchOutcome::Failure("connection refused".to_string()),
        },
        now,
    );
    assert_eq!(state_label(state.view().state), "ERROR");
    let commands = state.retry();
    first_fetch(&commands);
    assert_eq!(state_label(state.view().state), "LOADING");
}

#[test]
fn demo_backend_reaches_ready_through_deltas() {
    let backend = FakeBackend::new(2);
    let t0 = Instant::now();
    let mut state = AppState::new(RefreshController::new(RefreshSettings::default()));
    let mut pending = state.start();

    // Drive the controller synchronously against the demo backend.
    for second in 0..60u64 {
        let now = t0 + Duration::from_secs(second);
        pending.extend(state.tick(now));
        while !pending.is_empty() {
            let mut follow_up = Vec::new();
            for cmd in pending.drain(..) {
                let delta = match cmd {
                    ProviderCommand::PollStatus => Delta::StatusPolled(backend.poll()),
                    ProviderCommand::FetchSnapshot { seq, limit } => Delta::SnapshotFetched {
                        seq,
                        outcome: backend.fetch(limit),
                    },
                    ProviderCommand::Shutdown => continue,
                };
                follow_up.extend(apply_delta(&mut state, delta, now));
            }
            pending = follow_up;
        }
        if state.view().state == RefreshState::Ready {
            break;
        }
    }

    assert_eq!(state.view().state, RefreshState::Ready);
    assert!(!state.opportunities().is_empty());
    assert!(state.logs.iter().any(|line| line.contains("warming up")));
}
