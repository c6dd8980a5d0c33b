pub mod battle;
pub mod boxes;
pub mod fair;

pub use battle::{handle_battle, BattleArgs};
pub use boxes::{handle_open, handle_seed_demo, handle_validate, OpenArgs, ValidateArgs};
pub use fair::{handle_fair_command, FairCommands};

use boxbattle_engine::{EngineError, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(label: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|e| EngineError::InvalidInput(format!("Invalid {} '{}': {}", label, raw, e)))
}
