use crate::error::{BoxBattleError, Result};
use crate::store::LootStore;
use crate::types::{
    count_since_rare_or_better, Battle, BattleParticipant, BattleStatus, Item, MysteryBox,
    OpeningRecord, Rarity, RoundRecord,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    boxes: HashMap<Uuid, MysteryBox>,
    loose_items: HashMap<Uuid, Item>,
    /// Per user, oldest first.
    openings: HashMap<Uuid, Vec<(OpeningRecord, Rarity)>>,
    battles: HashMap<Uuid, Battle>,
    rounds: Vec<RoundRecord>,
    failing_users: HashSet<Uuid>,
}

impl MemoryState {
    fn rarity_of(&self, item_id: Uuid) -> Rarity {
        self.boxes
            .values()
            .flat_map(|b| b.items.iter())
            .chain(self.loose_items.values())
            .find(|item| item.id == item_id)
            .map(|item| item.rarity)
            .unwrap_or(Rarity::Unrecognized)
    }

    fn check_user(&self, user_id: Uuid) -> Result<()> {
        if self.failing_users.contains(&user_id) {
            return Err(BoxBattleError::transient(format!(
                "Injected failure for user {}",
                user_id
            )));
        }
        Ok(())
    }
}

/// Map-backed store with the same contract as the SQLite one.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every per-user read and write for `user_id` fail with `TransientIo`.
    pub fn fail_requests_for(&self, user_id: Uuid) {
        self.state.write().failing_users.insert(user_id);
    }

    pub fn clear_failures(&self) {
        self.state.write().failing_users.clear();
    }

    pub fn round_records(&self, battle_id: Uuid) -> Vec<RoundRecord> {
        self.state
            .read()
            .rounds
            .iter()
            .filter(|r| r.battle_id == battle_id)
            .cloned()
            .collect()
    }

    pub fn openings_for(&self, user_id: Uuid) -> Vec<OpeningRecord> {
        self.state
            .read()
            .openings
            .get(&user_id)
            .map(|list| list.iter().map(|(record, _)| record.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LootStore for MemoryStore {
    async fn get_box(&self, box_id: Uuid) -> Result<MysteryBox> {
        self.state
            .read()
            .boxes
            .get(&box_id)
            .cloned()
            .ok_or_else(|| BoxBattleError::not_found(format!("Box {}", box_id)))
    }

    async fn save_box(&self, mystery_box: &MysteryBox) -> Result<()> {
        let mut stored = mystery_box.clone();
        for item in &mut stored.items {
            item.box_id = Some(mystery_box.id);
        }

        let mut state = self.state.write();
        if let Some(previous) = state.boxes.insert(mystery_box.id, stored) {
            for mut item in previous.items {
                if !mystery_box.items.iter().any(|i| i.id == item.id) {
                    item.box_id = None;
                    state.loose_items.insert(item.id, item);
                }
            }
        }
        for item in &mystery_box.items {
            state.loose_items.remove(&item.id);
        }
        Ok(())
    }

    async fn save_item(&self, item: &Item) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.loose_items.remove(&item.id);
        for mystery_box in state.boxes.values_mut() {
            let box_id = mystery_box.id;
            mystery_box
                .items
                .retain(|existing| existing.id != item.id || item.box_id == Some(box_id));
        }

        let target = item.box_id.and_then(|box_id| state.boxes.get_mut(&box_id));
        match target {
            Some(mystery_box) => {
                match mystery_box.items.iter_mut().find(|i| i.id == item.id) {
                    Some(existing) => *existing = item.clone(),
                    None => mystery_box.items.push(item.clone()),
                }
            }
            None => {
                state.loose_items.insert(item.id, item.clone());
            }
        }
        Ok(())
    }

    async fn recent_item_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let state = self.state.read();
        state.check_user(user_id)?;
        Ok(state
            .openings
            .get(&user_id)
            .map(|list| {
                list.iter()
                    .rev()
                    .take(limit)
                    .map(|(record, _)| record.item_id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn boxes_since_rare_or_better(&self, user_id: Uuid) -> Result<u32> {
        let state = self.state.read();
        state.check_user(user_id)?;
        Ok(state
            .openings
            .get(&user_id)
            .map(|list| count_since_rare_or_better(list.iter().rev().map(|(_, r)| *r)))
            .unwrap_or(0))
    }

    async fn record_opening(&self, record: &OpeningRecord) -> Result<()> {
        let mut state = self.state.write();
        state.check_user(record.user_id)?;
        let rarity = state.rarity_of(record.item_id);
        state
            .openings
            .entry(record.user_id)
            .or_default()
            .push((record.clone(), rarity));
        Ok(())
    }

    async fn create_battle(&self, battle: &Battle) -> Result<()> {
        let mut state = self.state.write();
        if state.battles.contains_key(&battle.id) {
            return Err(BoxBattleError::invalid_state(format!(
                "Battle {} already exists",
                battle.id
            )));
        }
        state.battles.insert(battle.id, battle.clone());
        Ok(())
    }

    async fn add_participant(&self, battle_id: Uuid, user_id: Uuid) -> Result<BattleParticipant> {
        let mut state = self.state.write();
        let battle = state
            .battles
            .get_mut(&battle_id)
            .ok_or_else(|| BoxBattleError::not_found(format!("Battle {}", battle_id)))?;

        if battle.status != BattleStatus::Waiting {
            return Err(BoxBattleError::invalid_state(format!(
                "Battle {} is not accepting participants",
                battle_id
            )));
        }
        if battle.has_participant(user_id) {
            return Err(BoxBattleError::invalid_state(format!(
                "User {} already joined battle {}",
                user_id, battle_id
            )));
        }
        if battle.is_full() {
            return Err(BoxBattleError::invalid_state(format!(
                "Battle {} is full",
                battle_id
            )));
        }

        let participant =
            BattleParticipant::new(battle_id, user_id, battle.participants.len() as u32 + 1);
        battle.participants.push(participant.clone());
        Ok(participant)
    }

    async fn get_battle(&self, battle_id: Uuid) -> Result<Battle> {
        self.state
            .read()
            .battles
            .get(&battle_id)
            .cloned()
            .ok_or_else(|| BoxBattleError::not_found(format!("Battle {}", battle_id)))
    }

    async fn update_battle_status(
        &self,
        battle_id: Uuid,
        status: BattleStatus,
        winner_id: Option<Uuid>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let battle = state
            .battles
            .get_mut(&battle_id)
            .ok_or_else(|| BoxBattleError::not_found(format!("Battle {}", battle_id)))?;
        if !battle.status.can_transition_to(status) {
            return Err(BoxBattleError::invalid_state(format!(
                "Battle {} cannot move from {} to {}",
                battle_id, battle.status, status
            )));
        }
        battle.status = status;
        if winner_id.is_some() {
            battle.winner_id = winner_id;
        }
        Ok(())
    }

    async fn record_round(&self, record: &RoundRecord) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.check_user(record.user_id)?;

        let participant = state
            .battles
            .get_mut(&record.battle_id)
            .and_then(|battle| {
                battle
                    .participants
                    .iter_mut()
                    .find(|p| p.user_id == record.user_id)
            })
            .ok_or_else(|| {
                BoxBattleError::not_found(format!(
                    "Participant {} in battle {}",
                    record.user_id, record.battle_id
                ))
            })?;
        participant.award(record.award());
        state.rounds.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_matches_contract() {
        let store = MemoryStore::new();
        let mystery_box = MysteryBox::new("Mixed", 100, Rarity::Rare)
            .with_item(Item::new("Common", Rarity::Common, 9000, 10))
            .with_item(Item::new("Mythical", Rarity::Mythical, 1000, 10_000));
        store.save_box(&mystery_box).await.unwrap();

        let user = Uuid::new_v4();
        let common = mystery_box.items[0].id;
        let mythical = mystery_box.items[1].id;
        for item_id in [common, mythical, common, common] {
            store
                .record_opening(&OpeningRecord::new(user, mystery_box.id, item_id))
                .await
                .unwrap();
        }

        let recent = store.recent_item_ids(user, 3).await.unwrap();
        assert_eq!(recent, vec![common, common, mythical]);
        assert_eq!(store.boxes_since_rare_or_better(user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.fail_requests_for(user);

        let err = store.recent_item_ids(user, 10).await.unwrap_err();
        assert!(err.is_transient());

        store.clear_failures();
        assert!(store.recent_item_ids(user, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resave_detaches_dropped_items() {
        let store = MemoryStore::new();
        let mut mystery_box = MysteryBox::new("Starter", 100, Rarity::Common)
            .with_item(Item::new("Retired", Rarity::Epic, 5000, 100))
            .with_item(Item::new("Kept", Rarity::Common, 5000, 10));
        store.save_box(&mystery_box).await.unwrap();
        let retired = mystery_box.items.remove(0);
        store.save_box(&mystery_box).await.unwrap();

        let loaded = store.get_box(mystery_box.id).await.unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].name, "Kept");

        // history still sees the detached item's rarity
        let user = Uuid::new_v4();
        store
            .record_opening(&OpeningRecord::new(user, mystery_box.id, retired.id))
            .await
            .unwrap();
        assert_eq!(store.boxes_since_rare_or_better(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_item_moves_between_boxes() {
        let store = MemoryStore::new();
        let first = MysteryBox::new("First", 100, Rarity::Common)
            .with_item(Item::new("Roamer", Rarity::Rare, 10_000, 50));
        let second = MysteryBox::new("Second", 100, Rarity::Common);
        store.save_box(&first).await.unwrap();
        store.save_box(&second).await.unwrap();

        let mut moved = first.items[0].clone();
        moved.box_id = Some(second.id);
        store.save_item(&moved).await.unwrap();

        assert!(store.get_box(first.id).await.unwrap().items.is_empty());
        assert_eq!(store.get_box(second.id).await.unwrap().items.len(), 1);
    }
}
