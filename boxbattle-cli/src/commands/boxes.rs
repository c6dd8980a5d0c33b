use super::parse_uuid;
use boxbattle_core::{EngineConfig, ErrorKind, Item, LootStore, MysteryBox, Rarity};
use boxbattle_engine::opening::load_box;
use boxbattle_engine::selector::validate_table;
use boxbattle_engine::{BoxOpener, OutcomeSelector, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Args)]
pub struct OpenArgs {
    /// Box id (the demo box when omitted)
    #[arg(short, long)]
    pub box_id: Option<String>,
    /// User id (a new user when omitted)
    #[arg(short, long)]
    pub user: Option<String>,
    /// Number of boxes to open
    #[arg(short, long, default_value = "1")]
    pub count: u32,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Box id (the demo box when omitted)
    #[arg(short, long)]
    pub box_id: Option<String>,
}

/// Fixed so repeated runs against one database share a single demo box.
pub const DEMO_BOX_ID: Uuid = Uuid::from_u128(0x6d79_7374_6572_7900_0000_0000_0000_0001);

pub fn demo_box() -> MysteryBox {
    let mut mystery_box = MysteryBox::new("Starter Crate", 250, Rarity::Rare);
    mystery_box.id = DEMO_BOX_ID;
    mystery_box.featured = true;

    let items = [
        ("Sticker Pack", Rarity::Common, 5200, 40),
        ("Field Gloves", Rarity::Rare, 2800, 180),
        ("Carbon Visor", Rarity::Epic, 1400, 650),
        ("Gilded Knife", Rarity::Legendary, 500, 4200),
        ("Void Dragon", Rarity::Mythical, 100, 25000),
    ];
    for (index, (name, rarity, drop_chance, value)) in items.into_iter().enumerate() {
        let mut item = Item::new(name, rarity, drop_chance, value);
        item.id = Uuid::from_u128(DEMO_BOX_ID.as_u128() + 1 + index as u128);
        mystery_box = mystery_box.with_item(item);
    }
    mystery_box
}

pub async fn handle_seed_demo(store: &dyn LootStore) -> Result<()> {
    let mystery_box = demo_box();
    store.save_box(&mystery_box).await?;

    println!("Stored demo box '{}'", mystery_box.name);
    println!("  ID: {}", mystery_box.id);
    println!("  Items: {}", mystery_box.items.len());
    Ok(())
}

/// Resolve the box argument. Without one, the demo box is used and stored
/// on first use.
pub async fn resolve_box(store: &dyn LootStore, box_id: Option<String>) -> Result<Uuid> {
    if let Some(raw) = box_id {
        return parse_uuid("box id", &raw);
    }

    match store.get_box(DEMO_BOX_ID).await {
        Ok(_) => Ok(DEMO_BOX_ID),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            store.save_box(&demo_box()).await?;
            tracing::debug!(box_id = %DEMO_BOX_ID, "Stored demo box");
            Ok(DEMO_BOX_ID)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn handle_open(
    args: OpenArgs,
    store: Arc<dyn LootStore>,
    config: &EngineConfig,
) -> Result<()> {
    let box_id = resolve_box(store.as_ref(), args.box_id).await?;
    let user_id = match args.user {
        Some(raw) => parse_uuid("user id", &raw)?,
        None => Uuid::new_v4(),
    };

    let opener = BoxOpener::new(store, OutcomeSelector::new(), config.clone());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Item", "Rarity", "Value", "Since Epic+"]);

    let mut total = 0u64;
    for index in 1..=args.count {
        let outcome = opener.open(user_id, box_id).await?;
        total = total.saturating_add(outcome.item.value);
        table.add_row(vec![
            index.to_string(),
            outcome.item.name.clone(),
            outcome.item.rarity.to_string(),
            outcome.item.value.to_string(),
            outcome.history.boxes_since_rare_or_better.to_string(),
        ]);
    }

    println!("User: {}", user_id);
    println!("{}", table);
    println!("Total value: {}", total);
    Ok(())
}

pub async fn handle_validate(
    args: ValidateArgs,
    store: &dyn LootStore,
    config: &EngineConfig,
) -> Result<()> {
    let box_id = resolve_box(store, args.box_id).await?;
    let mystery_box = load_box(store, box_id).await?;
    let report = validate_table(&mystery_box, config.validation_tolerance)?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Item", "Rarity", "Weight"]);
    for entry in &report.entries {
        table.add_row(vec![
            entry.name.clone(),
            entry.rarity.to_string(),
            entry.weight.to_string(),
        ]);
    }

    println!("Box: {} ({})", mystery_box.name, mystery_box.id);
    println!("{}", table);
    println!(
        "Total: {} ({})",
        report.total,
        if report.within_tolerance {
            "within tolerance"
        } else {
            "OUT OF TOLERANCE"
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxbattle_core::Storage;

    #[tokio::test]
    async fn test_resolve_box_reuses_stored_demo_box() {
        let storage = Storage::in_memory().await.unwrap();

        let first = resolve_box(&storage, None).await.unwrap();
        let mut renamed = storage.get_box(first).await.unwrap();
        renamed.name = "Renamed".into();
        storage.save_box(&renamed).await.unwrap();

        let second = resolve_box(&storage, None).await.unwrap();
        assert_eq!(first, second);
        let stored = storage.get_box(second).await.unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.items.len(), 5);
    }

    #[tokio::test]
    async fn test_resolve_box_parses_explicit_id() {
        let storage = Storage::in_memory().await.unwrap();
        let id = Uuid::new_v4();
        assert_eq!(resolve_box(&storage, Some(id.to_string())).await.unwrap(), id);
        assert!(resolve_box(&storage, Some("nope".into())).await.is_err());
    }
}
