pub mod battle_store;
pub mod box_store;
pub mod memory;
pub mod opening_store;

pub use battle_store::BattleStore;
pub use box_store::BoxStore;
pub use memory::MemoryStore;
pub use opening_store::OpeningStore;

use crate::error::{BoxBattleError, Result};
use crate::store::LootStore;
use crate::types::{
    Battle, BattleParticipant, BattleStatus, Item, MysteryBox, OpeningRecord, RoundRecord,
};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

/// SQLite-backed store. One connection, serialized behind an async mutex.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BoxBattleError::internal(format!("Failed to create directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)?;
        Self::with_connection(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS boxes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                price INTEGER NOT NULL,
                rarity TEXT NOT NULL,
                featured INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        // sort_order fixes the walk order of the cumulative draw
        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                box_id TEXT,
                name TEXT NOT NULL,
                description TEXT,
                icon_url TEXT,
                rarity TEXT NOT NULL,
                drop_chance INTEGER NOT NULL,
                value INTEGER NOT NULL,
                sort_order INTEGER NOT NULL,
                FOREIGN KEY (box_id) REFERENCES boxes(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS openings (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                box_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                opened_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_openings_user ON openings (user_id, opened_at)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS battles (
                id TEXT PRIMARY KEY,
                box_id TEXT NOT NULL,
                max_players INTEGER NOT NULL,
                total_rounds INTEGER NOT NULL,
                status TEXT NOT NULL,
                winner_id TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS battle_participants (
                battle_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                total_value INTEGER NOT NULL DEFAULT 0,
                is_eliminated INTEGER NOT NULL DEFAULT 0,
                joined_at INTEGER NOT NULL,
                FOREIGN KEY (battle_id) REFERENCES battles(id),
                PRIMARY KEY (battle_id, user_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS battle_rounds (
                battle_id TEXT NOT NULL,
                round INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                item_name TEXT NOT NULL,
                rarity TEXT NOT NULL,
                value INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (battle_id) REFERENCES battles(id),
                PRIMARY KEY (battle_id, round, user_id)
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Parse a UUID stored as TEXT, reporting the column on failure.
pub(crate) fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[async_trait]
impl LootStore for Storage {
    async fn get_box(&self, box_id: Uuid) -> Result<MysteryBox> {
        BoxStore::new(self).load_box(box_id).await
    }

    async fn save_box(&self, mystery_box: &MysteryBox) -> Result<()> {
        BoxStore::new(self).save_box(mystery_box).await
    }

    async fn save_item(&self, item: &Item) -> Result<()> {
        BoxStore::new(self).save_item(item).await
    }

    async fn recent_item_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        OpeningStore::new(self).recent_item_ids(user_id, limit).await
    }

    async fn boxes_since_rare_or_better(&self, user_id: Uuid) -> Result<u32> {
        OpeningStore::new(self)
            .boxes_since_rare_or_better(user_id)
            .await
    }

    async fn record_opening(&self, record: &OpeningRecord) -> Result<()> {
        OpeningStore::new(self).save_opening(record).await
    }

    async fn create_battle(&self, battle: &Battle) -> Result<()> {
        BattleStore::new(self).save_battle(battle).await
    }

    async fn add_participant(&self, battle_id: Uuid, user_id: Uuid) -> Result<BattleParticipant> {
        BattleStore::new(self)
            .add_participant(battle_id, user_id)
            .await
    }

    async fn get_battle(&self, battle_id: Uuid) -> Result<Battle> {
        BattleStore::new(self).load_battle(battle_id).await
    }

    async fn update_battle_status(
        &self,
        battle_id: Uuid,
        status: BattleStatus,
        winner_id: Option<Uuid>,
    ) -> Result<()> {
        BattleStore::new(self)
            .update_status(battle_id, status, winner_id)
            .await
    }

    async fn record_round(&self, record: &RoundRecord) -> Result<()> {
        BattleStore::new(self).save_round(record).await
    }
}
