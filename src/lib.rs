pub mod api_fetch;
pub mod config;
pub mod countdown;
pub mod fake_feed;
pub mod http_client;
pub mod provider;
pub mod refresh;
pub mod state;
pub mod timers;
