use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::{env_override_u64, env_override_usize, normalize_api_url, parse_bool_flag};

pub const DEFAULT_API_URL: &str = "http://localhost:2024";
const DEFAULT_ASSISTANT_ID: &str = "agent";
const DEFAULT_TYPING_SPEED_MS: u64 = 15;
const DEFAULT_QUIET_WINDOW_MS: u64 = 1_500;
const DEFAULT_THREAD_REFRESH_DELAY_MS: u64 = 300;
const DEFAULT_MAX_ACTIVE_WIDGETS: usize = 4;
const DEFAULT_MAX_WIDGET_WAITERS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub assistant_id: String,
    pub typing_speed: Duration,
    pub typing_enabled: bool,
    /// None disables the quiet-window completion heuristic entirely; rely on
    /// explicit end/error frames only.
    pub quiet_window: Option<Duration>,
    pub thread_refresh_delay: Duration,
    pub max_active_widgets: usize,
    pub max_widget_waiters: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = std::env::var("FLOATCHAT_API_URL")
            .map(|v| normalize_api_url(&v))
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_key = std::env::var("FLOATCHAT_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let assistant_id = std::env::var("FLOATCHAT_ASSISTANT_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ASSISTANT_ID.to_string());

        let typing_speed_ms =
            env_override_u64("FLOATCHAT_TYPING_SPEED_MS", DEFAULT_TYPING_SPEED_MS, 1, 500);
        let typing_enabled = std::env::var("FLOATCHAT_TYPING_EFFECT")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(true);

        // 0 means "no heuristic"; otherwise clamp to something sane.
        let quiet_window_ms = std::env::var("FLOATCHAT_QUIET_WINDOW_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_QUIET_WINDOW_MS);
        let quiet_window = if quiet_window_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(quiet_window_ms.clamp(100, 30_000)))
        };

        let thread_refresh_delay_ms = env_override_u64(
            "FLOATCHAT_THREAD_REFRESH_DELAY_MS",
            DEFAULT_THREAD_REFRESH_DELAY_MS,
            50,
            5_000,
        );

        let max_active_widgets = env_override_usize(
            "FLOATCHAT_MAX_ACTIVE_WIDGETS",
            DEFAULT_MAX_ACTIVE_WIDGETS,
            1,
            64,
        );
        let max_widget_waiters = env_override_usize(
            "FLOATCHAT_MAX_WIDGET_WAITERS",
            DEFAULT_MAX_WIDGET_WAITERS,
            0,
            256,
        );

        Ok(Self {
            api_url,
            api_key,
            assistant_id,
            typing_speed: Duration::from_millis(typing_speed_ms),
            typing_enabled,
            quiet_window,
            thread_refresh_delay: Duration::from_millis(thread_refresh_delay_ms),
            max_active_widgets,
            max_widget_waiters,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if reqwest::Url::parse(&self.api_url).is_err() {
            eprintln!(
                "warning: FLOATCHAT_API_URL '{}' does not parse as a URL; requests will fail",
                self.api_url
            );
        }

        if self.quiet_window.is_none() {
            eprintln!(
                "warning: quiet-window completion heuristic disabled; runs end only on explicit end/error frames"
            );
        }

        Ok(())
    }
}
