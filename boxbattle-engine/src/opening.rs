use crate::selector::OutcomeSelector;
use crate::{EngineError, Result};
use boxbattle_core::{
    BoxBattleError, DrawHistory, EngineConfig, ErrorKind, Item, LootStore, MysteryBox,
    OpeningRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Selector input for a user, read from the store.
pub async fn load_history(
    store: &dyn LootStore,
    user_id: Uuid,
    window: usize,
) -> Result<DrawHistory> {
    let recent = store.recent_item_ids(user_id, window).await?;
    let since = store.boxes_since_rare_or_better(user_id).await?;
    Ok(DrawHistory::new(recent, since))
}

/// Box with its items, `BoxNotFound` when absent.
pub async fn load_box(store: &dyn LootStore, box_id: Uuid) -> Result<MysteryBox> {
    store.get_box(box_id).await.map_err(|e| box_error(box_id, e))
}

fn box_error(box_id: Uuid, error: BoxBattleError) -> EngineError {
    if error.kind() == ErrorKind::NotFound {
        EngineError::BoxNotFound(box_id)
    } else {
        EngineError::Core(error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningOutcome {
    pub record: OpeningRecord,
    pub item: Item,
    /// History the draw was made with.
    pub history: DrawHistory,
}

/// Single box openings: history lookup, draw, record.
#[derive(Clone)]
pub struct BoxOpener {
    store: Arc<dyn LootStore>,
    selector: OutcomeSelector,
    config: EngineConfig,
}

impl BoxOpener {
    pub fn new(store: Arc<dyn LootStore>, selector: OutcomeSelector, config: EngineConfig) -> Self {
        Self {
            store,
            selector,
            config,
        }
    }

    pub async fn open(&self, user_id: Uuid, box_id: Uuid) -> Result<OpeningOutcome> {
        let mystery_box = load_box(self.store.as_ref(), box_id).await?;
        let history = load_history(self.store.as_ref(), user_id, self.config.history_window).await?;

        let item = self.selector.select(&mystery_box, &history)?.clone();
        let record = OpeningRecord::new(user_id, box_id, item.id);
        self.store.record_opening(&record).await?;

        tracing::info!(
            user_id = %user_id,
            box_id = %box_id,
            item = %item.name,
            rarity = %item.rarity,
            "Opened box"
        );

        Ok(OpeningOutcome {
            record,
            item,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedRandom;
    use boxbattle_core::{MemoryStore, Rarity};

    fn opener(store: Arc<MemoryStore>, roll: u32) -> BoxOpener {
        BoxOpener::new(
            store,
            OutcomeSelector::with_random(Arc::new(FixedRandom::new(roll))),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_open_records_and_feeds_history() {
        let store = Arc::new(MemoryStore::new());
        let mystery_box = MysteryBox::new("Starter", 100, Rarity::Common)
            .with_item(Item::new("Sticker", Rarity::Common, 9000, 5))
            .with_item(Item::new("Gloves", Rarity::Epic, 1000, 500));
        store.save_box(&mystery_box).await.unwrap();
        let user = Uuid::new_v4();

        let opener = opener(store.clone(), 0);
        let first = opener.open(user, mystery_box.id).await.unwrap();
        assert_eq!(first.item.name, "Sticker");
        assert_eq!(first.history, DrawHistory::default());

        let second = opener.open(user, mystery_box.id).await.unwrap();
        assert_eq!(second.history.recent_item_ids, vec![first.item.id]);
        assert_eq!(second.history.boxes_since_rare_or_better, 1);
        assert_eq!(store.openings_for(user).len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_boxes() {
        let store = Arc::new(MemoryStore::new());
        let opener = opener(store.clone(), 0);

        let missing = Uuid::new_v4();
        let err = opener.open(Uuid::new_v4(), missing).await.unwrap_err();
        assert!(matches!(err, EngineError::BoxNotFound(id) if id == missing));

        let empty = MysteryBox::new("Empty", 100, Rarity::Common);
        store.save_box(&empty).await.unwrap();
        let err = opener.open(Uuid::new_v4(), empty.id).await.unwrap_err();
        assert!(matches!(err, EngineError::EmptyBox(_)));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_transient() {
        let store = Arc::new(MemoryStore::new());
        let mystery_box = MysteryBox::new("Solo", 100, Rarity::Common)
            .with_item(Item::new("Only", Rarity::Common, 10_000, 1));
        store.save_box(&mystery_box).await.unwrap();
        let user = Uuid::new_v4();
        store.fail_requests_for(user);

        let err = opener(store.clone(), 0)
            .open(user, mystery_box.id)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(store.openings_for(user).is_empty());
    }
}
