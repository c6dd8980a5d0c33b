use crate::error::{BoxBattleError, Result};
use crate::storage::{parse_uuid, Storage};
use crate::types::{Battle, BattleParticipant, BattleStatus, Rarity, RoundAward, RoundRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

pub struct BattleStore<'a> {
    storage: &'a Storage,
}

impl<'a> BattleStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_battle(&self, battle: &Battle) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO battles (id, box_id, max_players, total_rounds, status, winner_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                battle.id.to_string(),
                battle.box_id.to_string(),
                battle.max_players as i64,
                battle.total_rounds as i64,
                battle.status.as_str(),
                battle.winner_id.map(|id| id.to_string()),
                battle.created_at.timestamp(),
            ],
        )?;

        tracing::debug!(battle_id = %battle.id, "Stored battle");
        Ok(())
    }

    pub async fn add_participant(
        &self,
        battle_id: Uuid,
        user_id: Uuid,
    ) -> Result<BattleParticipant> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let battle = tx
            .query_row(
                "SELECT status, max_players FROM battles WHERE id = ?1",
                params![battle_id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        let (status, max_players) =
            battle.ok_or_else(|| BoxBattleError::not_found(format!("Battle {}", battle_id)))?;

        if status.parse::<BattleStatus>()? != BattleStatus::Waiting {
            return Err(BoxBattleError::invalid_state(format!(
                "Battle {} is not accepting participants",
                battle_id
            )));
        }

        let already_joined: i64 = tx.query_row(
            "SELECT COUNT(*) FROM battle_participants WHERE battle_id = ?1 AND user_id = ?2",
            params![battle_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        if already_joined > 0 {
            return Err(BoxBattleError::invalid_state(format!(
                "User {} already joined battle {}",
                user_id, battle_id
            )));
        }

        let joined: i64 = tx.query_row(
            "SELECT COUNT(*) FROM battle_participants WHERE battle_id = ?1",
            params![battle_id.to_string()],
            |row| row.get(0),
        )?;
        if joined >= max_players {
            return Err(BoxBattleError::invalid_state(format!(
                "Battle {} is full",
                battle_id
            )));
        }

        let participant = BattleParticipant::new(battle_id, user_id, joined as u32 + 1);
        tx.execute(
            "INSERT INTO battle_participants
             (battle_id, user_id, position, total_value, is_eliminated, joined_at)
             VALUES (?1, ?2, ?3, 0, 0, ?4)",
            params![
                battle_id.to_string(),
                user_id.to_string(),
                participant.position as i64,
                Utc::now().timestamp(),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(
            battle_id = %battle_id,
            user_id = %user_id,
            position = participant.position,
            "Stored participant"
        );
        Ok(participant)
    }

    pub async fn load_battle(&self, battle_id: Uuid) -> Result<Battle> {
        let conn = self.storage.get_connection().await;
        let id = battle_id.to_string();

        let battle = conn
            .query_row(
                "SELECT box_id, max_players, total_rounds, status, winner_id, created_at
                 FROM battles WHERE id = ?1",
                params![id],
                |row| {
                    let box_id: String = row.get(0)?;
                    let max_players: i64 = row.get(1)?;
                    let total_rounds: i64 = row.get(2)?;
                    let status: String = row.get(3)?;
                    let winner_id: Option<String> = row.get(4)?;
                    let created_at: i64 = row.get(5)?;

                    let status = status.parse::<BattleStatus>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;

                    Ok(Battle {
                        id: battle_id,
                        box_id: parse_uuid(0, &box_id)?,
                        max_players: max_players as u32,
                        total_rounds: total_rounds as u32,
                        status,
                        winner_id: winner_id.as_deref().map(|w| parse_uuid(4, w)).transpose()?,
                        created_at: DateTime::from_timestamp(created_at, 0)
                            .unwrap_or_else(Utc::now),
                        participants: Vec::new(),
                    })
                },
            )
            .optional()?;

        let mut battle =
            battle.ok_or_else(|| BoxBattleError::not_found(format!("Battle {}", battle_id)))?;

        let mut awards: HashMap<Uuid, Vec<RoundAward>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT round, user_id, item_id, item_name, rarity, value
                 FROM battle_rounds WHERE battle_id = ?1 ORDER BY round ASC",
            )?;
            let round_iter = stmt.query_map(params![id], |row| {
                let round: i64 = row.get(0)?;
                let user_id: String = row.get(1)?;
                let item_id: String = row.get(2)?;
                let rarity: String = row.get(4)?;
                let value: i64 = row.get(5)?;

                Ok((
                    parse_uuid(1, &user_id)?,
                    RoundAward {
                        round: round as u32,
                        item_id: parse_uuid(2, &item_id)?,
                        item_name: row.get(3)?,
                        rarity: rarity.parse::<Rarity>().unwrap_or(Rarity::Unrecognized),
                        value: value as u64,
                    },
                ))
            })?;
            for entry in round_iter {
                let (user_id, award) = entry?;
                awards.entry(user_id).or_default().push(award);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT user_id, position, total_value, is_eliminated
             FROM battle_participants WHERE battle_id = ?1 ORDER BY position ASC",
        )?;
        let participant_iter = stmt.query_map(params![id], |row| {
            let user_id: String = row.get(0)?;
            let position: i64 = row.get(1)?;
            let total_value: i64 = row.get(2)?;

            Ok(BattleParticipant {
                battle_id,
                user_id: parse_uuid(0, &user_id)?,
                position: position as u32,
                total_value: total_value as u64,
                is_eliminated: row.get(3)?,
                awards: Vec::new(),
            })
        })?;

        for participant in participant_iter {
            let mut participant = participant?;
            participant.awards = awards.remove(&participant.user_id).unwrap_or_default();
            battle.participants.push(participant);
        }

        Ok(battle)
    }

    pub async fn update_status(
        &self,
        battle_id: Uuid,
        status: BattleStatus,
        winner_id: Option<Uuid>,
    ) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let current = tx
            .query_row(
                "SELECT status FROM battles WHERE id = ?1",
                params![battle_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| BoxBattleError::not_found(format!("Battle {}", battle_id)))?
            .parse::<BattleStatus>()?;

        if !current.can_transition_to(status) {
            return Err(BoxBattleError::invalid_state(format!(
                "Battle {} cannot move from {} to {}",
                battle_id, current, status
            )));
        }

        tx.execute(
            "UPDATE battles SET status = ?1, winner_id = COALESCE(?2, winner_id) WHERE id = ?3",
            params![
                status.as_str(),
                winner_id.map(|id| id.to_string()),
                battle_id.to_string(),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(battle_id = %battle_id, status = %status, "Updated battle status");
        Ok(())
    }

    /// Writes the round row and bumps the participant total atomically.
    pub async fn save_round(&self, record: &RoundRecord) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO battle_rounds
             (battle_id, round, user_id, item_id, item_name, rarity, value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.battle_id.to_string(),
                record.round as i64,
                record.user_id.to_string(),
                record.item_id.to_string(),
                record.item_name,
                record.rarity.as_str(),
                record.value as i64,
                record.created_at.timestamp(),
            ],
        )?;

        let updated = tx.execute(
            "UPDATE battle_participants SET total_value = total_value + ?1
             WHERE battle_id = ?2 AND user_id = ?3",
            params![
                record.value as i64,
                record.battle_id.to_string(),
                record.user_id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(BoxBattleError::not_found(format!(
                "Participant {} in battle {}",
                record.user_id, record.battle_id
            )));
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_join_rules() {
        let storage = Storage::in_memory().await.unwrap();
        let store = BattleStore::new(&storage);

        let battle = Battle::new(Uuid::new_v4(), 2, 3);
        store.save_battle(&battle).await.unwrap();

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let first = store.add_participant(battle.id, alice).await.unwrap();
        assert_eq!(first.position, 1);

        let twice = store.add_participant(battle.id, alice).await.unwrap_err();
        assert!(matches!(twice, BoxBattleError::InvalidState(_)));

        let second = store.add_participant(battle.id, bob).await.unwrap();
        assert_eq!(second.position, 2);

        let full = store
            .add_participant(battle.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(full, BoxBattleError::InvalidState(_)));

        let missing = store
            .add_participant(Uuid::new_v4(), alice)
            .await
            .unwrap_err();
        assert!(matches!(missing, BoxBattleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_join_after_start() {
        let storage = Storage::in_memory().await.unwrap();
        let store = BattleStore::new(&storage);

        let battle = Battle::new(Uuid::new_v4(), 4, 1);
        store.save_battle(&battle).await.unwrap();
        store
            .update_status(battle.id, BattleStatus::Active, None)
            .await
            .unwrap();

        let err = store
            .add_participant(battle.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, BoxBattleError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let storage = Storage::in_memory().await.unwrap();
        let store = BattleStore::new(&storage);

        let battle = Battle::new(Uuid::new_v4(), 2, 1);
        store.save_battle(&battle).await.unwrap();
        store
            .update_status(battle.id, BattleStatus::Finished, None)
            .await
            .unwrap();

        let err = store
            .update_status(battle.id, BattleStatus::Active, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BoxBattleError::InvalidState(_)));

        let err = store
            .update_status(battle.id, BattleStatus::Finished, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BoxBattleError::InvalidState(_)));
        assert_eq!(
            store.load_battle(battle.id).await.unwrap().status,
            BattleStatus::Finished
        );

        let missing = store
            .update_status(Uuid::new_v4(), BattleStatus::Active, None)
            .await
            .unwrap_err();
        assert!(matches!(missing, BoxBattleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rounds_fold_into_participants() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(&temp_dir.path().join("battles.db"))
            .await
            .unwrap();
        let store = BattleStore::new(&storage);

        let battle = Battle::new(Uuid::new_v4(), 2, 2);
        store.save_battle(&battle).await.unwrap();
        let alice = Uuid::new_v4();
        store.add_participant(battle.id, alice).await.unwrap();

        let item = Item::new("Knife", Rarity::Legendary, 100, 12_500);
        store
            .save_round(&RoundRecord::new(battle.id, 1, alice, &item))
            .await
            .unwrap();
        store
            .save_round(&RoundRecord::new(battle.id, 2, alice, &item))
            .await
            .unwrap();
        store
            .update_status(battle.id, BattleStatus::Finished, Some(alice))
            .await
            .unwrap();

        let loaded = store.load_battle(battle.id).await.unwrap();
        assert_eq!(loaded.status, BattleStatus::Finished);
        assert_eq!(loaded.winner_id, Some(alice));
        assert_eq!(loaded.participants.len(), 1);
        assert_eq!(loaded.participants[0].total_value, 25_000);
        assert_eq!(loaded.participants[0].awards.len(), 2);
        assert_eq!(loaded.participants[0].awards[1].round, 2);
    }

    #[tokio::test]
    async fn test_round_for_unknown_participant_fails() {
        let storage = Storage::in_memory().await.unwrap();
        let store = BattleStore::new(&storage);
        let battle = Battle::new(Uuid::new_v4(), 2, 1);
        store.save_battle(&battle).await.unwrap();

        let item = Item::new("Coin", Rarity::Common, 10_000, 1);
        let err = store
            .save_round(&RoundRecord::new(battle.id, 1, Uuid::new_v4(), &item))
            .await
            .unwrap_err();
        assert!(matches!(err, BoxBattleError::NotFound(_)));

        // The round row was rolled back with the failed update
        let conn = storage.get_connection().await;
        let rounds: i64 = conn
            .query_row("SELECT COUNT(*) FROM battle_rounds", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rounds, 0);
    }
}
