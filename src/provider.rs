use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::state::{Delta, FetchOutcome, PollOutcome, ProviderCommand};

const SLOW_REQUEST: Duration = Duration::from_secs(2);

/// Reports whether the backend holds data. Implementations must not fail:
/// transport problems come back as [`PollOutcome::Unavailable`].
pub trait StatusPoller {
    fn poll(&self) -> PollOutcome;
}

/// Requests the ranked dataset, folding every not-ready encoding into
/// [`FetchOutcome::NotReady`].
pub trait SnapshotFetcher {
    fn fetch(&self, limit: u32) -> FetchOutcome;
}

/// Runs backend calls on a dedicated thread. Commands are handled in arrival
/// order; the thread exits on [`ProviderCommand::Shutdown`] or when either
/// channel closes.
pub fn spawn_provider<B>(
    backend: B,
    tx: Sender<Delta>,
    cmd_rx: Receiver<ProviderCommand>,
) -> JoinHandle<()>
where
    B: StatusPoller + SnapshotFetcher + Send + 'static,
{
    thread::spawn(move || {
        while let Ok(cmd) = cmd_rx.recv() {
            let delta = match cmd {
                ProviderCommand::PollStatus => Delta::StatusPolled(backend.poll()),
                ProviderCommand::FetchSnapshot { seq, limit } => {
                    let started = Instant::now();
                    let outcome = backend.fetch(limit);
                    let elapsed = started.elapsed();
                    if elapsed >= SLOW_REQUEST
                        && tx
                            .send(Delta::Log(format!(
                                "[WARN] Snapshot request #{seq} took {:.1}s",
                                elapsed.as_secs_f64()
                            )))
                            .is_err()
                    {
                        break;
                    }
                    Delta::SnapshotFetched { seq, outcome }
                }
                ProviderCommand::Shutdown => break,
            };
            if tx.send(delta).is_err() {
                break;
            }
        }
    })
}
