use crate::error::{BoxBattleError, Result};
use crate::storage::{parse_uuid, Storage};
use crate::types::{Item, MysteryBox, Rarity};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

pub struct BoxStore<'a> {
    storage: &'a Storage,
}

impl<'a> BoxStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Save a box and its items. Items keep the order they have in the box.
    /// Items no longer listed are detached, not deleted, so past openings
    /// still resolve their rarity.
    pub async fn save_box(&self, mystery_box: &MysteryBox) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO boxes (id, name, price, rarity, featured, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                mystery_box.id.to_string(),
                mystery_box.name,
                mystery_box.price as i64,
                mystery_box.rarity.as_str(),
                mystery_box.featured,
                Utc::now().timestamp(),
            ],
        )?;

        tx.execute(
            "UPDATE items SET box_id = NULL WHERE box_id = ?1",
            params![mystery_box.id.to_string()],
        )?;

        for (order, item) in mystery_box.items.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO items
                 (id, box_id, name, description, icon_url, rarity, drop_chance, value, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    item.id.to_string(),
                    mystery_box.id.to_string(),
                    item.name,
                    item.description,
                    item.icon_url,
                    item.rarity.as_str(),
                    item.drop_chance as i64,
                    item.value as i64,
                    order as i64,
                ],
            )?;
        }

        tx.commit()?;

        tracing::info!(
            "Saved box {} with {} items",
            mystery_box.id,
            mystery_box.items.len()
        );
        Ok(())
    }

    /// Upsert one item. An existing item keeps its place in the walk order.
    pub async fn save_item(&self, item: &Item) -> Result<()> {
        let conn = self.storage.get_connection().await;
        let box_id = item.box_id.map(|id| id.to_string());

        conn.execute(
            "INSERT INTO items
             (id, box_id, name, description, icon_url, rarity, drop_chance, value, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                     (SELECT COALESCE(MAX(sort_order), -1) + 1 FROM items WHERE box_id IS ?2))
             ON CONFLICT(id) DO UPDATE SET
                box_id = excluded.box_id,
                name = excluded.name,
                description = excluded.description,
                icon_url = excluded.icon_url,
                rarity = excluded.rarity,
                drop_chance = excluded.drop_chance,
                value = excluded.value",
            params![
                item.id.to_string(),
                box_id,
                item.name,
                item.description,
                item.icon_url,
                item.rarity.as_str(),
                item.drop_chance as i64,
                item.value as i64,
            ],
        )?;

        Ok(())
    }

    pub async fn load_box(&self, box_id: Uuid) -> Result<MysteryBox> {
        let conn = self.storage.get_connection().await;

        let header = conn
            .query_row(
                "SELECT name, price, rarity, featured FROM boxes WHERE id = ?1",
                params![box_id.to_string()],
                |row| {
                    let price: i64 = row.get(1)?;
                    let rarity: String = row.get(2)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        price as u64,
                        rarity.parse::<Rarity>().unwrap_or(Rarity::Unrecognized),
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        let (name, price, rarity, featured) =
            header.ok_or_else(|| BoxBattleError::not_found(format!("Box {}", box_id)))?;

        let mut stmt = conn.prepare(
            "SELECT id, name, description, icon_url, rarity, drop_chance, value
             FROM items WHERE box_id = ?1 ORDER BY sort_order ASC",
        )?;

        let item_iter = stmt.query_map(params![box_id.to_string()], |row| {
            let id: String = row.get(0)?;
            let rarity: String = row.get(4)?;
            let drop_chance: i64 = row.get(5)?;
            let value: i64 = row.get(6)?;

            Ok(Item {
                id: parse_uuid(0, &id)?,
                box_id: Some(box_id),
                name: row.get(1)?,
                description: row.get(2)?,
                icon_url: row.get(3)?,
                rarity: rarity.parse::<Rarity>().unwrap_or(Rarity::Unrecognized),
                drop_chance: drop_chance as u32,
                value: value as u64,
            })
        })?;

        let mut items = Vec::new();
        for item in item_iter {
            items.push(item?);
        }

        Ok(MysteryBox {
            id: box_id,
            name,
            price,
            rarity,
            featured,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxBattleError;

    #[tokio::test]
    async fn test_box_round_trip_keeps_item_order() {
        let storage = Storage::in_memory().await.unwrap();
        let store = BoxStore::new(&storage);

        let mystery_box = MysteryBox::new("Starter", 500, Rarity::Common)
            .with_item(Item::new("Zeta", Rarity::Common, 7000, 100))
            .with_item(Item::new("Alpha", Rarity::Epic, 3000, 900));
        store.save_box(&mystery_box).await.unwrap();

        let loaded = store.load_box(mystery_box.id).await.unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.items[0].name, "Zeta");
        assert_eq!(loaded.items[1].name, "Alpha");
        assert_eq!(loaded.items[1].rarity, Rarity::Epic);
        assert_eq!(loaded.price, 500);
    }

    #[tokio::test]
    async fn test_resave_replaces_item_set() {
        let storage = Storage::in_memory().await.unwrap();
        let store = BoxStore::new(&storage);

        let mut mystery_box = MysteryBox::new("Starter", 500, Rarity::Common)
            .with_item(Item::new("Retired", Rarity::Common, 5000, 100))
            .with_item(Item::new("Kept", Rarity::Rare, 3000, 300))
            .with_item(Item::new("Also Kept", Rarity::Epic, 2000, 900));
        store.save_box(&mystery_box).await.unwrap();

        mystery_box.items.remove(0);
        mystery_box.items.reverse();
        store.save_box(&mystery_box).await.unwrap();

        let loaded = store.load_box(mystery_box.id).await.unwrap();
        let names: Vec<&str> = loaded.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Also Kept", "Kept"]);
    }

    #[tokio::test]
    async fn test_save_item_appends_to_box() {
        let storage = Storage::in_memory().await.unwrap();
        let store = BoxStore::new(&storage);

        let mystery_box = MysteryBox::new("Starter", 500, Rarity::Common)
            .with_item(Item::new("First", Rarity::Common, 5000, 100));
        store.save_box(&mystery_box).await.unwrap();

        let mut extra = Item::new("Second", Rarity::Rare, 5000, 300);
        extra.box_id = Some(mystery_box.id);
        store.save_item(&extra).await.unwrap();

        let mut first = mystery_box.items[0].clone();
        first.value = 150;
        store.save_item(&first).await.unwrap();

        let loaded = store.load_box(mystery_box.id).await.unwrap();
        assert_eq!(loaded.items[0].name, "First");
        assert_eq!(loaded.items[0].value, 150);
        assert_eq!(loaded.items[1].name, "Second");
    }

    #[tokio::test]
    async fn test_missing_box_is_not_found() {
        let storage = Storage::in_memory().await.unwrap();
        let err = BoxStore::new(&storage)
            .load_box(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, BoxBattleError::NotFound(_)));
    }
}
