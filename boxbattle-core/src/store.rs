//! Persistence collaborator consumed by the engine.
//!
//! Every method may fail; the engine never retries on its own.

use crate::error::Result;
use crate::types::{Battle, BattleParticipant, BattleStatus, Item, MysteryBox, OpeningRecord, RoundRecord};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait LootStore: Send + Sync {
    /// Box with its items. `NotFound` when absent.
    async fn get_box(&self, box_id: Uuid) -> Result<MysteryBox>;

    /// Insert or replace a box definition and its items.
    async fn save_box(&self, mystery_box: &MysteryBox) -> Result<()>;

    /// Insert or replace a single item.
    async fn save_item(&self, item: &Item) -> Result<()>;

    /// Item ids of the user's most recent openings, newest first, at most `limit`.
    async fn recent_item_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>>;

    /// Consecutive newest openings below epic rarity.
    async fn boxes_since_rare_or_better(&self, user_id: Uuid) -> Result<u32>;

    async fn record_opening(&self, record: &OpeningRecord) -> Result<()>;

    async fn create_battle(&self, battle: &Battle) -> Result<()>;

    /// Append a participant. `InvalidState` when the battle is not waiting,
    /// already full, or the user has already joined.
    async fn add_participant(&self, battle_id: Uuid, user_id: Uuid) -> Result<BattleParticipant>;

    /// Battle with its participants ordered by position.
    async fn get_battle(&self, battle_id: Uuid) -> Result<Battle>;

    /// Move a battle to `status`. `InvalidState` when the stored status does
    /// not allow the transition, so two racing writers cannot both succeed.
    async fn update_battle_status(
        &self,
        battle_id: Uuid,
        status: BattleStatus,
        winner_id: Option<Uuid>,
    ) -> Result<()>;

    /// Persist one participant's round draw and fold it into their total.
    async fn record_round(&self, record: &RoundRecord) -> Result<()>;
}
