use std::env;
use std::time::Duration;

use crate::refresh::RefreshSettings;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_LIMIT: u32 = 25;
const MAX_LIMIT: u32 = 100;
const MAX_WARMUP_POLL_SECS: u64 = 3_600;
const MAX_DRIFT_REFRESH_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_url: String,
    pub limit: u32,
    pub warmup_poll: Duration,
    pub drift_interval: Duration,
    pub demo: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            limit: DEFAULT_LIMIT,
            warmup_poll: Duration::from_secs(3),
            drift_interval: Duration::from_secs(60),
            demo: false,
        }
    }
}

impl AppConfig {
    /// Reads `.env.local`, `.env` and the process environment.
    pub fn load() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let api_url = lookup("STREAMSCOUT_API_URL")
            .map(|val| normalize_url(&val))
            .filter(|val| !val.is_empty())
            .unwrap_or(defaults.api_url);
        let limit = lookup("STREAMSCOUT_LIMIT")
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);
        let warmup_poll = lookup("WARMUP_POLL_SECS")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(3)
            .clamp(1, MAX_WARMUP_POLL_SECS);
        let drift_interval = lookup("DRIFT_REFRESH_SECS")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(60)
            .clamp(10, MAX_DRIFT_REFRESH_SECS);
        let demo = lookup("STREAMSCOUT_DEMO")
            .map(|val| is_truthy(&val))
            .unwrap_or(false);

        Self {
            api_url,
            limit,
            warmup_poll: Duration::from_secs(warmup_poll),
            drift_interval: Duration::from_secs(drift_interval),
            demo,
        }
    }

    /// Applies `--demo`, `--api-url=<url>` and `--limit=<n>` on top of the
    /// environment. Unknown arguments are returned so the caller can report them.
    pub fn apply_args<I, S>(&mut self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = args.into_iter().map(Into::into).collect::<Vec<String>>();
        let mut unknown = Vec::new();
        let mut idx = 0;
        while idx < args.len() {
            let arg = args[idx].as_str();
            if arg == "--demo" {
                self.demo = true;
            } else if let Some(url) = arg.strip_prefix("--api-url=") {
                self.set_api_url(url);
            } else if arg == "--api-url" {
                if let Some(next) = args.get(idx + 1) {
                    self.set_api_url(next);
                    idx += 1;
                }
            } else if let Some(raw) = arg.strip_prefix("--limit=") {
                self.set_limit(raw);
            } else if arg == "--limit" {
                if let Some(next) = args.get(idx + 1) {
                    self.set_limit(next);
                    idx += 1;
                }
            } else {
                unknown.push(arg.to_string());
            }
            idx += 1;
        }
        unknown
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            limit: self.limit,
            warmup_poll: self.warmup_poll,
            drift_interval: self.drift_interval,
        }
    }

    fn set_api_url(&mut self, raw: &str) {
        let url = normalize_url(raw);
        if !url.is_empty() {
            self.api_url = url;
        }
    }

    fn set_limit(&mut self, raw: &str) {
        if let Ok(limit) = raw.trim().parse::<u32>() {
            self.limit = limit.clamp(1, MAX_LIMIT);
        }
    }
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
