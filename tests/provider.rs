use std::sync::Mutex;
use std::sync::mpsc;
use std::time::Duration;

use streamscout_terminal::provider::{SnapshotFetcher, StatusPoller, spawn_provider};
use streamscout_terminal::state::{
    Delta, FetchOutcome, PollOutcome, ProviderCommand, Snapshot, StatusSnapshot,
};

/// Backend stub that records the limits it was asked for.
#[derive(Default)]
struct ScriptedBackend {
    limits: Mutex<Vec<u32>>,
}

impl StatusPoller for ScriptedBackend {
    fn poll(&self) -> PollOutcome {
        PollOutcome::Status(StatusSnapshot {
            has_data: true,
            data_age_seconds: Some(12),
            next_refresh_seconds: 300,
            is_server_refreshing: false,
        })
    }
}

impl SnapshotFetcher for ScriptedBackend {
    fn fetch(&self, limit: u32) -> FetchOutcome {
        if let Ok(mut limits) = self.limits.lock() {
            limits.push(limit);
        }
        if limit == 0 {
            return FetchOutcome::Failure("bad limit".to_string());
        }
        FetchOutcome::Data(Snapshot {
            generated_at: None,
            total_analyzed: limit as u64,
            opportunities: Vec::new(),
            refresh_interval_seconds: 600,
            next_update: None,
            server_refreshing: false,
        })
    }
}

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn commands_come_back_as_deltas_in_order() {
    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let handle = spawn_provider(ScriptedBackend::default(), tx, cmd_rx);

    cmd_tx.send(ProviderCommand::PollStatus).expect("send poll");
    cmd_tx
        .send(ProviderCommand::FetchSnapshot { seq: 4, limit: 10 })
        .expect("send fetch");
    cmd_tx
        .send(ProviderCommand::FetchSnapshot { seq: 5, limit: 0 })
        .expect("send fetch");

    match rx.recv_timeout(WAIT).expect("status delta") {
        Delta::StatusPolled(PollOutcome::Status(status)) => assert!(status.has_data),
        other => panic!("unexpected delta {other:?}"),
    }
    match rx.recv_timeout(WAIT).expect("snapshot delta") {
        Delta::SnapshotFetched {
            seq,
            outcome: FetchOutcome::Data(snapshot),
        } => {
            assert_eq!(seq, 4);
            assert_eq!(snapshot.total_analyzed, 10);
        }
        other => panic!("unexpected delta {other:?}"),
    }
    match rx.recv_timeout(WAIT).expect("failure delta") {
        Delta::SnapshotFetched {
            seq,
            outcome: FetchOutcome::Failure(reason),
        } => {
            assert_eq!(seq, 5);
            assert_eq!(reason, "bad limit");
        }
        other => panic!("unexpected delta {other:?}"),
    }

    cmd_tx.send(ProviderCommand::Shutdown).expect("send shutdown");
    handle.join().expect("provider thread exits cleanly");
}

#[test]
fn shutdown_stops_processing_later_commands() {
    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let handle = spawn_provider(ScriptedBackend::default(), tx, cmd_rx);

    cmd_tx.send(ProviderCommand::Shutdown).expect("send shutdown");
    let _ = cmd_tx.send(ProviderCommand::PollStatus);
    handle.join().expect("provider thread exits cleanly");
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn dropping_the_command_sender_ends_the_thread() {
    let (tx, _rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel::<ProviderCommand>();
    let handle = spawn_provider(ScriptedBackend::default(), tx, cmd_rx);
    drop(cmd_tx);
    handle.join().expect("provider thread exits cleanly");
}
