use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::http_client::http_client;
use crate::provider::{SnapshotFetcher, StatusPoller};
use crate::state::{
    FetchOutcome, Opportunity, OpportunityScores, PollOutcome, PurchaseLinks, Snapshot,
    StatusSnapshot,
};

const STATUS_PATH: &str = "/api/v1/status";
const ANALYZE_PATH: &str = "/api/v1/analyze";

/// Used when the response advertises neither interval field.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;
/// Dedicated "processing, try later" status.
pub const PROCESSING_STATUS: StatusCode = StatusCode::ACCEPTED;
const WARMING_UP: &str = "warming_up";

/// Talks to the analysis backend over HTTP.
pub struct HttpBackend {
    base_url: String,
    client: &'static Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("api base url is empty"));
        }
        Ok(Self {
            base_url,
            client: http_client()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn fetch_status(&self) -> Result<StatusSnapshot> {
        let url = format!("{}{STATUS_PATH}", self.base_url);
        let resp = self.client.get(&url).send().context("request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, truncate(&body, 120)));
        }
        parse_status_json(&body)
    }

    fn fetch_analyze(&self, limit: u32) -> Result<(StatusCode, String)> {
        let url = format!("{}{ANALYZE_PATH}?limit={limit}", self.base_url);
        let resp = self.client.get(&url).send().context("request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        Ok((status, body))
    }
}

impl StatusPoller for HttpBackend {
    fn poll(&self) -> PollOutcome {
        match self.fetch_status() {
            Ok(status) => PollOutcome::Status(status),
            Err(err) => PollOutcome::Unavailable(format!("{err:#}")),
        }
    }
}

impl SnapshotFetcher for HttpBackend {
    fn fetch(&self, limit: u32) -> FetchOutcome {
        match self.fetch_analyze(limit) {
            Ok((status, body)) => classify_analyze_response(status, &body),
            Err(err) => FetchOutcome::Failure(format!("{err:#}")),
        }
    }
}

/// Maps an `/api/v1/analyze` response to a [`FetchOutcome`].
///
/// Not-ready is recognised from the dedicated status code, from a
/// `"status": "warming_up"` field in a success body, and from the same field in
/// the body of an error response. Anything else that is not a fully parsed
/// snapshot is a failure.
pub fn classify_analyze_response(status: StatusCode, body: &str) -> FetchOutcome {
    if status == PROCESSING_STATUS {
        return FetchOutcome::NotReady;
    }
    if is_warming_up_body(body) {
        return FetchOutcome::NotReady;
    }
    if !status.is_success() {
        return FetchOutcome::Failure(format!("http {}: {}", status, truncate(body, 120)));
    }
    match parse_analyze_json(body) {
        Ok(snapshot) => FetchOutcome::Data(snapshot),
        Err(err) => FetchOutcome::Failure(format!("{err:#}")),
    }
}

pub fn is_warming_up_body(raw: &str) -> bool {
    let Ok(root) = serde_json::from_str::<Value>(raw.trim()) else {
        return false;
    };
    // Some error envelopes nest the payload under "detail".
    [Some(&root), root.get("detail")]
        .into_iter()
        .flatten()
        .any(|v| v.get("status").and_then(Value::as_str) == Some(WARMING_UP))
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    cache: CacheSection,
    #[serde(default)]
    worker: WorkerSection,
}

#[derive(Debug, Deserialize)]
struct CacheSection {
    #[serde(default)]
    has_data: Option<bool>,
    #[serde(default)]
    age_seconds: Option<f64>,
    #[serde(default)]
    next_refresh_seconds: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct WorkerSection {
    #[serde(default)]
    is_refreshing: Option<bool>,
}

pub fn parse_status_json(raw: &str) -> Result<StatusSnapshot> {
    let envelope: StatusEnvelope =
        serde_json::from_str(raw.trim()).context("invalid status json")?;
    let seconds = |v: Option<f64>| v.filter(|n| n.is_finite()).map(|n| n.max(0.0).round() as u64);

    Ok(StatusSnapshot {
        has_data: envelope.cache.has_data.unwrap_or(false),
        data_age_seconds: seconds(envelope.cache.age_seconds),
        next_refresh_seconds: seconds(envelope.cache.next_refresh_seconds).unwrap_or(0),
        is_server_refreshing: envelope.worker.is_refreshing.unwrap_or(false),
    })
}

pub fn parse_analyze_json(raw: &str) -> Result<Snapshot> {
    let root: Value = serde_json::from_str(raw.trim()).context("invalid analyze json")?;
    let entries = root
        .get("top_opportunities")
        .and_then(Value::as_array)
        .context("analyze response has no top_opportunities")?;

    let mut opportunities: Vec<Opportunity> = entries.iter().filter_map(parse_opportunity).collect();
    opportunities.sort_by_key(|o| o.rank);
    opportunities.dedup_by_key(|o| o.rank);

    Ok(Snapshot {
        generated_at: pick_string(&root, &["timestamp"]).and_then(|ts| parse_timestamp(&ts)),
        total_analyzed: pick_u64(&root, &["total_games_analyzed"]).unwrap_or(0),
        opportunities,
        refresh_interval_seconds: effective_refresh_interval(&root),
        next_update: pick_string(&root, &["next_update"]),
        server_refreshing: root
            .get("is_refreshing")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// `next_refresh_in_seconds` wins over the older `cache_expires_in_seconds`;
/// with neither present the default applies.
pub fn effective_refresh_interval(root: &Value) -> u64 {
    pick_u64(root, &["next_refresh_in_seconds", "cache_expires_in_seconds"])
        .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS)
}

fn parse_opportunity(value: &Value) -> Option<Opportunity> {
    let rank = u32::try_from(pick_u64(value, &["rank"])?).ok()?;
    let name = pick_string(value, &["game_name", "name"])?;
    let links = value.get("purchase_links").unwrap_or(&Value::Null);

    Some(Opportunity {
        rank,
        name,
        total_viewers: pick_u64(value, &["total_viewers", "viewers"]).unwrap_or(0),
        channels: pick_u64(value, &["channels"]).unwrap_or(0),
        avg_viewers_per_channel: pick_f64(value, &["avg_viewers_per_channel"]).unwrap_or(0.0),
        scores: OpportunityScores {
            discoverability: score(value, "discoverability_score"),
            viability: score(value, "viability_score"),
            engagement: score(value, "engagement_score"),
            overall: score(value, "overall_score"),
        },
        recommendation: pick_string(value, &["recommendation"]).unwrap_or_default(),
        trend: pick_string(value, &["trend"]).unwrap_or_default(),
        box_art_url: pick_string(value, &["box_art_url"]),
        purchase_links: PurchaseLinks {
            steam: pick_string(links, &["steam"]),
            epic: pick_string(links, &["epic"]),
            free: links.get("free").and_then(Value::as_bool).unwrap_or(false),
        },
    })
}

fn score(value: &Value, key: &str) -> f64 {
    pick_f64(value, &[key])
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    None
}

// Blank strings count as absent so a later key can still supply the value.
fn pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = value.get(*key)
            && !s.trim().is_empty()
        {
            return Some(s.trim().to_string());
        }
    }
    None
}

// Negative numbers clamp to zero; null and non-numeric values count as absent.
fn pick_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    for key in keys {
        let Some(v) = value.get(*key) else {
            continue;
        };
        if let Some(num) = v.as_u64() {
            return Some(num);
        }
        if let Some(num) = v.as_i64() {
            return Some(num.max(0) as u64);
        }
        if let Some(num) = v.as_f64().filter(|n| n.is_finite()) {
            return Some(num.max(0.0).round() as u64);
        }
        if let Some(num) = v.as_str().and_then(|s| s.trim().parse::<u64>().ok()) {
            return Some(num);
        }
    }
    None
}

fn pick_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        let Some(v) = value.get(*key) else {
            continue;
        };
        if let Some(num) = v.as_f64() {
            return Some(num);
        }
        if let Some(num) = v.as_str().and_then(|s| s.trim().parse::<f64>().ok()) {
            return Some(num);
        }
    }
    None
}

fn truncate(raw: &str, max: usize) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
