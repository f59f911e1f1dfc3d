use std::sync::Mutex;

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::api_fetch::classify_analyze_response;
use crate::provider::{SnapshotFetcher, StatusPoller};
use crate::state::{FetchOutcome, PollOutcome, StatusSnapshot};

const DEMO_REFRESH_SECS: u64 = 45;

const DEMO_GAMES: &[(&str, Option<u32>, bool)] = &[
    ("Hollow Knight", Some(367520), false),
    ("Balatro", Some(2379780), false),
    ("Lethal Company", Some(1966720), false),
    ("Vampire Survivors", Some(1794680), false),
    ("Dredge", Some(1562430), false),
    ("Brotato", Some(1942280), false),
    ("Dave the Diver", Some(1868140), false),
    ("Pizza Tower", Some(2231450), false),
    ("Hades II", Some(1145350), false),
    ("Warframe", Some(230410), true),
    ("Path of Exile", Some(238960), true),
    ("Celeste", Some(504230), false),
    ("Satisfactory", Some(526870), false),
    ("Cult of the Lamb", Some(1313140), false),
    ("Inscryption", Some(1092790), false),
];

/// In-process stand-in for the analysis backend.
///
/// The first `warmup_polls` status checks report a running computation, then
/// data appears. Not-ready answers rotate through the three wire encodings so
/// the demo exercises the same classifier as the HTTP backend.
pub struct FakeBackend {
    inner: Mutex<FakeState>,
}

struct FakeState {
    polls: u32,
    warmup_polls: u32,
    fetches: u32,
    generated: u32,
}

impl FakeBackend {
    pub fn new(warmup_polls: u32) -> Self {
        Self {
            inner: Mutex::new(FakeState {
                polls: 0,
                warmup_polls,
                fetches: 0,
                generated: 0,
            }),
        }
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new(3)
    }
}

impl StatusPoller for FakeBackend {
    fn poll(&self) -> PollOutcome {
        let Ok(mut state) = self.inner.lock() else {
            return PollOutcome::Unavailable("demo backend lock poisoned".to_string());
        };
        state.polls += 1;
        if state.polls == 1 {
            return PollOutcome::Unavailable("connection refused (demo)".to_string());
        }
        let has_data = state.polls > state.warmup_polls;
        PollOutcome::Status(StatusSnapshot {
            has_data,
            data_age_seconds: has_data.then_some(0),
            next_refresh_seconds: DEMO_REFRESH_SECS,
            is_server_refreshing: !has_data,
        })
    }
}

impl SnapshotFetcher for FakeBackend {
    fn fetch(&self, limit: u32) -> FetchOutcome {
        let Ok(mut state) = self.inner.lock() else {
            return FetchOutcome::Failure("demo backend lock poisoned".to_string());
        };
        state.fetches += 1;
        if state.polls <= state.warmup_polls {
            let (status, body) = not_ready_response(state.fetches);
            return classify_analyze_response(status, &body);
        }
        state.generated += 1;
        let body = demo_body(limit, state.generated);
        classify_analyze_response(StatusCode::OK, &body.to_string())
    }
}

fn not_ready_response(attempt: u32) -> (StatusCode, String) {
    let warming = json!({ "status": "warming_up", "message": "Initial data fetch in progress" });
    match attempt % 3 {
        0 => (StatusCode::ACCEPTED, String::new()),
        1 => (StatusCode::OK, warming.to_string()),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "detail": warming }).to_string(),
        ),
    }
}

fn demo_body(limit: u32, generation: u32) -> Value {
    let mut rng = rand::thread_rng();
    let mut rows = DEMO_GAMES
        .iter()
        .map(|(name, steam_id, free)| {
            let channels: u64 = rng.gen_range(3..400);
            let viewers: u64 = channels * rng.gen_range(4..180);
            let discoverability: f64 = rng.gen_range(0.05..1.0);
            let viability: f64 = rng.gen_range(0.05..1.0);
            let engagement: f64 = rng.gen_range(0.05..1.0);
            let overall = (discoverability * 0.45 + viability * 0.35 + engagement * 0.2).min(1.0);
            let trend = match rng.gen_range(0..3) {
                0 => "up",
                1 => "down",
                _ => "stable",
            };
            (overall, json!({
                "game_name": name,
                "total_viewers": viewers,
                "channels": channels,
                "avg_viewers_per_channel": viewers as f64 / channels as f64,
                "discoverability_score": discoverability,
                "viability_score": viability,
                "engagement_score": engagement,
                "overall_score": overall,
                "recommendation": recommendation_for(overall),
                "trend": trend,
                "box_art_url": format!("https://static-cdn.jtvnw.net/ttv-boxart/{}-285x380.jpg", name.replace(' ', "%20")),
                "purchase_links": {
                    "steam": steam_id.map(|id| format!("https://store.steampowered.com/app/{id}")),
                    "epic": Value::Null,
                    "free": free,
                },
            }))
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| b.0.total_cmp(&a.0));

    let opportunities = rows
        .into_iter()
        .take(limit as usize)
        .enumerate()
        .map(|(idx, (_, mut row))| {
            row["rank"] = json!(idx + 1);
            row
        })
        .collect::<Vec<_>>();

    let now = Utc::now();
    let next = now + ChronoDuration::seconds(DEMO_REFRESH_SECS as i64);
    json!({
        "timestamp": now.to_rfc3339(),
        "total_games_analyzed": 180 + generation,
        "top_opportunities": opportunities,
        "next_refresh_in_seconds": DEMO_REFRESH_SECS,
        "cache_expires_in_seconds": DEMO_REFRESH_SECS * 2,
        "next_update": next.format("%H:%M:%S UTC").to_string(),
        "is_refreshing": false,
    })
}

fn recommendation_for(overall: f64) -> &'static str {
    if overall >= 0.75 {
        "Excellent opportunity"
    } else if overall >= 0.55 {
        "Good opportunity"
    } else if overall >= 0.35 {
        "Moderate opportunity"
    } else {
        "Crowded market"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_not_ready_encoding_classifies_as_not_ready() {
        for attempt in 0..3 {
            let (status, body) = not_ready_response(attempt);
            assert_eq!(classify_analyze_response(status, &body), FetchOutcome::NotReady);
        }
    }

    #[test]
    fn serves_ranked_data_after_warmup() {
        let backend = FakeBackend::new(1);
        assert!(matches!(backend.poll(), PollOutcome::Unavailable(_)));
        assert!(matches!(
            backend.poll(),
            PollOutcome::Status(StatusSnapshot { has_data: true, .. })
        ));
        let FetchOutcome::Data(snapshot) = backend.fetch(5) else {
            panic!("expected data after warm-up");
        };
        assert_eq!(snapshot.opportunities.len(), 5);
        assert_eq!(snapshot.refresh_interval_seconds, DEMO_REFRESH_SECS);
        let ranks = snapshot.opportunities.iter().map(|o| o.rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }
}
