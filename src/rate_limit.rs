use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::LimitsConfig;
use crate::errors::{PanelError, PanelResult};

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window admission control, keyed by verified identity (never by
/// connection). Checked before any allocation work begins; this bounds
/// retry storms, it is not a correctness mechanism.
pub struct RateLimiter {
    creates_per_hour: u32,
    power_actions_per_minute: u32,
    create_window: Duration,
    power_window: Duration,
    windows: DashMap<(String, &'static str), Window>,
}

impl RateLimiter {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self::with_windows(
            limits,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        )
    }

    fn with_windows(limits: &LimitsConfig, create_window: Duration, power_window: Duration) -> Self {
        Self {
            creates_per_hour: limits.creates_per_hour,
            power_actions_per_minute: limits.power_actions_per_minute,
            create_window,
            power_window,
            windows: DashMap::new(),
        }
    }

    pub fn check_create(&self, user_id: &str) -> PanelResult<()> {
        self.check(user_id, "create", self.creates_per_hour, self.create_window)
    }

    pub fn check_power(&self, user_id: &str) -> PanelResult<()> {
        self.check(
            user_id,
            "power",
            self.power_actions_per_minute,
            self.power_window,
        )
    }

    fn check(
        &self,
        user_id: &str,
        rule: &'static str,
        limit: u32,
        window: Duration,
    ) -> PanelResult<()> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((user_id.to_string(), rule))
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });

        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= limit {
            return Err(PanelError::RateLimited(rule));
        }
        entry.count += 1;
        Ok(())
    }
}
