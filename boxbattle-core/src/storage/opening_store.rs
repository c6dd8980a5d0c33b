use crate::error::Result;
use crate::storage::{parse_uuid, Storage};
use crate::types::{OpeningRecord, Rarity};
use rusqlite::params;
use uuid::Uuid;

pub struct OpeningStore<'a> {
    storage: &'a Storage,
}

impl<'a> OpeningStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_opening(&self, record: &OpeningRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        // Openings are append-only facts
        conn.execute(
            "INSERT INTO openings (id, user_id, box_id, item_id, opened_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.user_id.to_string(),
                record.box_id.to_string(),
                record.item_id.to_string(),
                record.opened_at.timestamp_millis(),
            ],
        )?;

        tracing::debug!(
            user_id = %record.user_id,
            box_id = %record.box_id,
            item_id = %record.item_id,
            "Recorded opening"
        );
        Ok(())
    }

    pub async fn recent_item_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT item_id FROM openings WHERE user_id = ?1
             ORDER BY opened_at DESC, rowid DESC LIMIT ?2",
        )?;

        let id_iter = stmt.query_map(params![user_id.to_string(), limit as i64], |row| {
            let raw: String = row.get(0)?;
            parse_uuid(0, &raw)
        })?;

        let mut ids = Vec::new();
        for id in id_iter {
            ids.push(id?);
        }

        Ok(ids)
    }

    /// Walks the history newest first and stops at the first epic+ item.
    pub async fn boxes_since_rare_or_better(&self, user_id: Uuid) -> Result<u32> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT i.rarity FROM openings o
             LEFT JOIN items i ON i.id = o.item_id
             WHERE o.user_id = ?1
             ORDER BY o.opened_at DESC, o.rowid DESC",
        )?;

        let mut rows = stmt.query(params![user_id.to_string()])?;
        let mut count = 0u32;
        while let Some(row) = rows.next()? {
            let rarity: Option<String> = row.get(0)?;
            let rarity = rarity
                .as_deref()
                .map(|raw| raw.parse::<Rarity>().unwrap_or(Rarity::Unrecognized))
                .unwrap_or(Rarity::Unrecognized);
            if rarity.is_rare_or_better() {
                break;
            }
            count += 1;
        }

        Ok(count)
    }
}
