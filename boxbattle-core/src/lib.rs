//! boxbattle core - data model, configuration and persistence
//!
//! This crate holds the types shared by the draw and battle engine, the
//! error taxonomy, and the persistence collaborator the engine consumes,
//! with SQLite and in-memory implementations.

pub mod config;
pub mod error;
pub mod storage;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use error::{BoxBattleError, ErrorKind, Result};
pub use storage::{MemoryStore, Storage};
pub use store::LootStore;
pub use types::{
    Battle, BattleParticipant, BattleStatus, DrawHistory, Item, MysteryBox, OpeningRecord, Rarity,
    RoundAward, RoundRecord,
};
