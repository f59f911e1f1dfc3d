use anyhow::{Context, Result};

use streamscout_terminal::api_fetch::HttpBackend;
use streamscout_terminal::config::AppConfig;
use streamscout_terminal::provider::{SnapshotFetcher, StatusPoller};
use streamscout_terminal::state::{FetchOutcome, PollOutcome};

fn main() -> Result<()> {
    let mut config = AppConfig::load();
    for arg in config.apply_args(std::env::args().skip(1)) {
        eprintln!("ignoring unknown argument: {arg}");
    }

    let backend = HttpBackend::new(&config.api_url).context("unable to create backend client")?;
    println!("Backend: {}", backend.base_url());

    match backend.poll() {
        PollOutcome::Status(status) => {
            println!("Has data: {}", if status.has_data { "yes" } else { "no" });
            match status.data_age_seconds {
                Some(age) => println!("Data age: {age}s"),
                None => println!("Data age: -"),
            }
            println!("Next server refresh: {}s", status.next_refresh_seconds);
            println!(
                "Worker refreshing: {}",
                if status.is_server_refreshing { "yes" } else { "no" }
            );
        }
        PollOutcome::Unavailable(reason) => println!("Status unavailable: {reason}"),
    }

    match backend.fetch(config.limit) {
        FetchOutcome::Data(snapshot) => {
            println!(
                "Snapshot: {} opportunities of {} games analyzed",
                snapshot.opportunities.len(),
                snapshot.total_analyzed
            );
            if let Some(ts) = snapshot.generated_at {
                println!("Generated: {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!("Refresh interval: {}s", snapshot.refresh_interval_seconds);
            for o in snapshot.opportunities.iter().take(10) {
                println!(
                    " {:>3}. {:<32} overall {:>3.0}%  viewers {:>7}  channels {:>4}",
                    o.rank,
                    o.name,
                    o.scores.overall * 100.0,
                    o.total_viewers,
                    o.channels
                );
            }
        }
        FetchOutcome::NotReady => println!("Snapshot: server is warming up, try again shortly"),
        FetchOutcome::Failure(reason) => {
            println!("Snapshot: failed ({reason})");
            std::process::exit(1);
        }
    }

    Ok(())
}
