use crate::error::{BoxBattleError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAX_HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between `battle_started` and the first round.
    pub start_delay: Duration,
    /// Delay between a round completing and the next one starting.
    pub round_delay: Duration,
    /// Recent openings fed to duplicate protection.
    pub history_window: usize,
    /// Allowed drift of a box's normalized table from 10,000.
    pub validation_tolerance: u64,
    pub default_max_players: u32,
    pub default_total_rounds: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(3),
            round_delay: Duration::from_secs(5),
            history_window: MAX_HISTORY_WINDOW,
            validation_tolerance: 100,
            default_max_players: 2,
            default_total_rounds: 3,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `BOXBATTLE_*` environment variables when present.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = read_u64("BOXBATTLE_START_DELAY_MS") {
            config.start_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = read_u64("BOXBATTLE_ROUND_DELAY_MS") {
            config.round_delay = Duration::from_millis(ms);
        }
        if let Some(window) = read_u64("BOXBATTLE_HISTORY_WINDOW") {
            config.history_window = window as usize;
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_window == 0 || self.history_window > MAX_HISTORY_WINDOW {
            return Err(BoxBattleError::config(format!(
                "History window must be between 1 and {}",
                MAX_HISTORY_WINDOW
            )));
        }

        if !(2..=8).contains(&self.default_max_players) {
            return Err(BoxBattleError::config(
                "Default max players must be between 2 and 8",
            ));
        }

        if self.default_total_rounds == 0 {
            return Err(BoxBattleError::config(
                "Default total rounds must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn read_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}
