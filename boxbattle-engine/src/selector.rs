//! Weighted item selection with duplicate protection and pity.
//!
//! Weights are integers throughout; every multiplication truncates, so a
//! box's adjusted table only approximately sums to `DRAW_SCALE`.

use crate::{EngineError, Result};
use boxbattle_core::types::DROP_CHANCE_SCALE;
use boxbattle_core::{DrawHistory, Item, MysteryBox, Rarity};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Normalized tables target this total, and draws land in `[0, DRAW_SCALE)`.
pub const DRAW_SCALE: u32 = 10_000;

/// Pity grows by one twentieth per box without an epic+ item.
const PITY_STEP_DIVISOR: u64 = 20;
const PITY_CAP_BOXES: u64 = 40;

/// Source of the single random value consumed by a draw.
pub trait RandomSource: Send + Sync {
    /// Uniform value in `[0, DRAW_SCALE)`.
    fn roll(&self) -> u32;
}

/// Operating-system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn roll(&self) -> u32 {
        OsRng.gen_range(0..DRAW_SCALE)
    }
}

/// `max(0.2, 1 - 0.2 * count)` for an item seen `count` times recently.
pub fn duplicate_multiplier(count: usize) -> f64 {
    duplicate_tenths(count) as f64 / 10.0
}

fn duplicate_tenths(count: usize) -> u64 {
    10 - 2 * count.min(4) as u64
}

/// `min(3.0, 1 + boxes / 20)`.
pub fn pity_multiplier(boxes_since_rare_or_better: u32) -> f64 {
    (1.0 + boxes_since_rare_or_better as f64 / PITY_STEP_DIVISOR as f64).min(3.0)
}

/// Rarity weight scaled by the item's drop chance, truncated.
pub fn base_weight(item: &Item) -> u64 {
    item.rarity.base_weight() * item.drop_chance as u64 / DROP_CHANCE_SCALE
}

/// Base weights rescaled so they approximately sum to `DRAW_SCALE`.
///
/// A box whose base weights all truncate to zero yields an all-zero table.
pub fn normalized_weights(items: &[Item]) -> Vec<u64> {
    let base: Vec<u64> = items.iter().map(base_weight).collect();
    let total: u64 = base.iter().sum();
    if total == 0 {
        return vec![0; items.len()];
    }
    base.iter()
        .map(|weight| weight * DRAW_SCALE as u64 / total)
        .collect()
}

fn apply_duplicate_protection(weight: u64, count: usize) -> u64 {
    if count == 0 {
        return weight;
    }
    weight * duplicate_tenths(count) / 10
}

fn apply_pity(weight: u64, rarity: Rarity, boxes_since_rare_or_better: u32) -> u64 {
    if !rarity.is_rare_or_better() {
        return weight;
    }
    let boxes = (boxes_since_rare_or_better as u64).min(PITY_CAP_BOXES);
    weight * (PITY_STEP_DIVISOR + boxes) / PITY_STEP_DIVISOR
}

/// Final per-item weights for a draw given the user's history.
pub fn adjusted_weights(items: &[Item], history: &DrawHistory) -> Vec<u64> {
    normalized_weights(items)
        .into_iter()
        .zip(items)
        .map(|(weight, item)| {
            let seen = history
                .recent_item_ids
                .iter()
                .filter(|id| **id == item.id)
                .count();
            let weight = apply_duplicate_protection(weight, seen);
            apply_pity(weight, item.rarity, history.boxes_since_rare_or_better)
        })
        .collect()
}

/// First index whose cumulative weight meets `roll`; the last index otherwise.
pub fn pick_index(weights: &[u64], roll: u64) -> usize {
    let mut cumulative = 0u64;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if cumulative >= roll {
            return index;
        }
    }
    weights.len().saturating_sub(1)
}

#[derive(Clone)]
pub struct OutcomeSelector {
    random: Arc<dyn RandomSource>,
}

impl Default for OutcomeSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeSelector {
    pub fn new() -> Self {
        Self::with_random(Arc::new(OsRandom))
    }

    pub fn with_random(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Draw one item from the box. Fails only when the box has no items.
    pub fn select<'a>(&self, mystery_box: &'a MysteryBox, history: &DrawHistory) -> Result<&'a Item> {
        let last = mystery_box
            .items
            .last()
            .ok_or(EngineError::EmptyBox(mystery_box.id))?;

        let weights = adjusted_weights(&mystery_box.items, history);
        let roll = self.random.roll() as u64;
        let index = pick_index(&weights, roll);

        tracing::debug!(
            box_id = %mystery_box.id,
            roll,
            index,
            "Selected item"
        );
        Ok(mystery_box.items.get(index).unwrap_or(last))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightEntry {
    pub item_id: Uuid,
    pub name: String,
    pub rarity: Rarity,
    pub weight: u64,
}

/// Normalized table for a box and whether it lands inside the tolerance band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub box_id: Uuid,
    pub entries: Vec<WeightEntry>,
    pub total: u64,
    pub within_tolerance: bool,
}

pub fn validate_table(mystery_box: &MysteryBox, tolerance: u64) -> Result<TableReport> {
    if mystery_box.items.is_empty() {
        return Err(EngineError::EmptyBox(mystery_box.id));
    }

    let weights = normalized_weights(&mystery_box.items);
    let total: u64 = weights.iter().sum();
    let entries = mystery_box
        .items
        .iter()
        .zip(weights)
        .map(|(item, weight)| WeightEntry {
            item_id: item.id,
            name: item.name.clone(),
            rarity: item.rarity,
            weight,
        })
        .collect();

    Ok(TableReport {
        box_id: mystery_box.id,
        entries,
        total,
        within_tolerance: total.abs_diff(DRAW_SCALE as u64) <= tolerance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedRandom;
    use proptest::prelude::*;

    fn rarity_strategy() -> impl Strategy<Value = Rarity> {
        prop_oneof![
            Just(Rarity::Common),
            Just(Rarity::Rare),
            Just(Rarity::Epic),
            Just(Rarity::Legendary),
            Just(Rarity::Mythical),
            Just(Rarity::Unrecognized),
        ]
    }

    fn box_strategy() -> impl Strategy<Value = MysteryBox> {
        prop::collection::vec((rarity_strategy(), 50u32..=10_000, 1u64..100_000), 1..20).prop_map(
            |entries| {
                entries
                    .into_iter()
                    .enumerate()
                    .fold(MysteryBox::new("Fuzz", 100, Rarity::Common), |b, (i, (r, d, v))| {
                        b.with_item(Item::new(format!("item-{}", i), r, d, v))
                    })
            },
        )
    }

    #[test]
    fn test_duplicate_multiplier_exact() {
        let expected = [1.0, 0.8, 0.6, 0.4, 0.2, 0.2];
        for (count, want) in expected.iter().enumerate() {
            assert_eq!(duplicate_multiplier(count), *want, "count {}", count);
        }
        assert_eq!(apply_duplicate_protection(1000, 3), 400);
        assert_eq!(apply_duplicate_protection(1000, 9), 200);
        assert_eq!(apply_duplicate_protection(999, 1), 799);
    }

    #[test]
    fn test_pity_multiplier_bounds() {
        assert_eq!(pity_multiplier(0), 1.0);
        assert_eq!(pity_multiplier(40), 3.0);
        assert_eq!(pity_multiplier(500), 3.0);
        assert_eq!(pity_multiplier(10), 1.5);

        let mut previous = pity_multiplier(0);
        for boxes in 1..=100 {
            let current = pity_multiplier(boxes);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_pity_only_boosts_epic_and_above() {
        assert_eq!(apply_pity(1000, Rarity::Common, 40), 1000);
        assert_eq!(apply_pity(1000, Rarity::Rare, 40), 1000);
        assert_eq!(apply_pity(1000, Rarity::Epic, 10), 1500);
        assert_eq!(apply_pity(1000, Rarity::Mythical, 80), 3000);
        assert_eq!(apply_pity(333, Rarity::Legendary, 0), 333);
    }

    #[test]
    fn test_weights_follow_rarity_and_drop_chance() {
        let mystery_box = MysteryBox::new("Pair", 100, Rarity::Common)
            .with_item(Item::new("Common", Rarity::Common, 5000, 10))
            .with_item(Item::new("Epic", Rarity::Epic, 5000, 100));

        // base 2500 and 750, total 3250
        assert_eq!(base_weight(&mystery_box.items[0]), 2500);
        assert_eq!(base_weight(&mystery_box.items[1]), 750);
        assert_eq!(normalized_weights(&mystery_box.items), vec![7692, 2307]);

        let history = DrawHistory::new(vec![mystery_box.items[0].id; 2], 20);
        // 7692 * 0.6 and 2307 * 2.0
        assert_eq!(adjusted_weights(&mystery_box.items, &history), vec![4615, 4614]);
    }

    #[test]
    fn test_pick_walks_cumulative_table() {
        let weights = [3000, 5000, 2000];
        assert_eq!(pick_index(&weights, 0), 0);
        assert_eq!(pick_index(&weights, 3000), 0);
        assert_eq!(pick_index(&weights, 3001), 1);
        assert_eq!(pick_index(&weights, 8000), 1);
        assert_eq!(pick_index(&weights, 9999), 2);
        // drift past the table falls back to the last item
        assert_eq!(pick_index(&[10, 10], 9999), 1);
        assert_eq!(pick_index(&[], 5), 0);
    }

    #[test]
    fn test_empty_box_is_not_found() {
        let selector = OutcomeSelector::new();
        let empty = MysteryBox::new("Empty", 100, Rarity::Common);
        let err = selector.select(&empty, &DrawHistory::default()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyBox(id) if id == empty.id));
        assert_eq!(err.kind(), boxbattle_core::ErrorKind::NotFound);
    }

    #[test]
    fn test_single_item_box_always_wins() {
        let mystery_box = MysteryBox::new("Solo", 100, Rarity::Common)
            .with_item(Item::new("Only", Rarity::Common, 10_000, 5));
        let only = mystery_box.items[0].id;

        let histories = [
            DrawHistory::default(),
            DrawHistory::new(vec![only; 10], 0),
            DrawHistory::new(vec![only; 3], 1_000),
        ];
        for roll in [0, 1, 5000, 9999] {
            let selector = OutcomeSelector::with_random(Arc::new(FixedRandom::new(roll)));
            for history in &histories {
                assert_eq!(selector.select(&mystery_box, history).unwrap().id, only);
            }
        }
    }

    #[test]
    fn test_duplicates_shift_the_draw() {
        let mystery_box = MysteryBox::new("Even", 100, Rarity::Common)
            .with_item(Item::new("A", Rarity::Common, 5000, 1))
            .with_item(Item::new("B", Rarity::Common, 5000, 1));
        let first = mystery_box.items[0].id;
        let selector = OutcomeSelector::with_random(Arc::new(FixedRandom::new(4000)));

        assert_eq!(
            selector
                .select(&mystery_box, &DrawHistory::default())
                .unwrap()
                .id,
            first
        );
        // A drops from 5000 to 1000, so a roll of 4000 now lands on B
        let history = DrawHistory::new(vec![first; 4], 0);
        assert_eq!(
            selector.select(&mystery_box, &history).unwrap().id,
            mystery_box.items[1].id
        );
    }

    #[test]
    fn test_validate_table() {
        let balanced = MysteryBox::new("Balanced", 100, Rarity::Common)
            .with_item(Item::new("A", Rarity::Common, 6000, 1))
            .with_item(Item::new("B", Rarity::Rare, 3000, 1))
            .with_item(Item::new("C", Rarity::Legendary, 1000, 1));
        let report = validate_table(&balanced, 100).unwrap();
        assert!(report.within_tolerance);
        assert_eq!(report.entries.len(), 3);
        assert!(report.total <= 10_000 && report.total >= 9_997);

        let starved = MysteryBox::new("Starved", 100, Rarity::Common)
            .with_item(Item::new("Dust", Rarity::Mythical, 10, 1));
        let report = validate_table(&starved, 100).unwrap();
        assert_eq!(report.total, 0);
        assert!(!report.within_tolerance);
    }

    #[test]
    fn test_os_random_stays_in_range() {
        let random = OsRandom;
        for _ in 0..1_000 {
            assert!(random.roll() < DRAW_SCALE);
        }
    }

    proptest! {
        #[test]
        fn prop_normalized_sum_within_tolerance(mystery_box in box_strategy()) {
            let total: u64 = normalized_weights(&mystery_box.items).iter().sum();
            prop_assert!(total.abs_diff(10_000) <= 100, "total {}", total);
        }

        #[test]
        fn prop_selector_returns_member(
            mystery_box in box_strategy(),
            roll in 0u32..10_000,
            repeats in 0usize..=10,
            since in 0u32..200,
        ) {
            let recent: Vec<Uuid> = mystery_box.items.iter().map(|i| i.id).cycle().take(repeats).collect();
            let history = DrawHistory::new(recent, since);
            let selector = OutcomeSelector::with_random(Arc::new(FixedRandom::new(roll)));

            let item = selector.select(&mystery_box, &history).unwrap();
            prop_assert!(mystery_box.items.iter().any(|candidate| candidate.id == item.id));
        }
    }
}
