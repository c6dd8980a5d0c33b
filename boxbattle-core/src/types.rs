use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Rarity tier of an item. Labels outside the known tiers parse as `Unrecognized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
    Mythical,
    #[serde(other)]
    Unrecognized,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
            Rarity::Mythical => "mythical",
            Rarity::Unrecognized => "unrecognized",
        }
    }

    /// Fixed base weight of the tier before the item's drop chance is applied.
    pub fn base_weight(&self) -> u64 {
        match self {
            Rarity::Common => 5000,
            Rarity::Rare => 2500,
            Rarity::Epic => 1500,
            Rarity::Legendary => 800,
            Rarity::Mythical => 200,
            Rarity::Unrecognized => 1000,
        }
    }

    /// Epic and above. These tiers reset the pity counter and receive its boost.
    pub fn is_rare_or_better(&self) -> bool {
        matches!(self, Rarity::Epic | Rarity::Legendary | Rarity::Mythical)
    }
}

impl FromStr for Rarity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "common" => Rarity::Common,
            "rare" => Rarity::Rare,
            "epic" => Rarity::Epic,
            "legendary" => Rarity::Legendary,
            "mythical" => Rarity::Mythical,
            _ => Rarity::Unrecognized,
        })
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop chances are expressed out of this many parts.
pub const DROP_CHANCE_SCALE: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub box_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub rarity: Rarity,
    /// Share of the box out of `DROP_CHANCE_SCALE`.
    pub drop_chance: u32,
    /// Value in minor currency units, used for battle scoring.
    pub value: u64,
}

impl Item {
    pub fn new(name: impl Into<String>, rarity: Rarity, drop_chance: u32, value: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            box_id: None,
            name: name.into(),
            description: None,
            icon_url: None,
            rarity,
            drop_chance,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MysteryBox {
    pub id: Uuid,
    pub name: String,
    /// Price in minor currency units.
    pub price: u64,
    pub rarity: Rarity,
    pub featured: bool,
    pub items: Vec<Item>,
}

impl MysteryBox {
    pub fn new(name: impl Into<String>, price: u64, rarity: Rarity) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            rarity,
            featured: false,
            items: Vec::new(),
        }
    }

    /// Attach an item, assigning it to this box.
    pub fn with_item(mut self, mut item: Item) -> Self {
        item.box_id = Some(self.id);
        self.items.push(item);
        self
    }
}

/// Immutable fact that a user opened a box and received an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub box_id: Uuid,
    pub item_id: Uuid,
    pub opened_at: DateTime<Utc>,
}

impl OpeningRecord {
    pub fn new(user_id: Uuid, box_id: Uuid, item_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            box_id,
            item_id,
            opened_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    Waiting,
    Active,
    Finished,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleStatus::Waiting => "waiting",
            BattleStatus::Active => "active",
            BattleStatus::Finished => "finished",
        }
    }

    /// `waiting -> active -> finished`, with `waiting -> finished` for a
    /// cancelled battle. Nothing leaves `finished`.
    pub fn can_transition_to(&self, next: BattleStatus) -> bool {
        matches!(
            (self, next),
            (BattleStatus::Waiting, BattleStatus::Active)
                | (BattleStatus::Waiting, BattleStatus::Finished)
                | (BattleStatus::Active, BattleStatus::Finished)
        )
    }
}

impl FromStr for BattleStatus {
    type Err = crate::BoxBattleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(BattleStatus::Waiting),
            "active" => Ok(BattleStatus::Active),
            "finished" => Ok(BattleStatus::Finished),
            other => Err(crate::BoxBattleError::invalid_input(format!(
                "Unknown battle status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item awarded to a participant in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundAward {
    pub round: u32,
    pub item_id: Uuid,
    pub item_name: String,
    pub rarity: Rarity,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleParticipant {
    pub battle_id: Uuid,
    pub user_id: Uuid,
    /// 1-based join order.
    pub position: u32,
    pub total_value: u64,
    pub is_eliminated: bool,
    pub awards: Vec<RoundAward>,
}

impl BattleParticipant {
    pub fn new(battle_id: Uuid, user_id: Uuid, position: u32) -> Self {
        Self {
            battle_id,
            user_id,
            position,
            total_value: 0,
            is_eliminated: false,
            awards: Vec::new(),
        }
    }

    /// Totals only ever grow.
    pub fn award(&mut self, award: RoundAward) {
        self.total_value = self.total_value.saturating_add(award.value);
        self.awards.push(award);
    }

    pub fn last_award(&self) -> Option<&RoundAward> {
        self.awards.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    pub id: Uuid,
    pub box_id: Uuid,
    pub max_players: u32,
    pub total_rounds: u32,
    pub status: BattleStatus,
    pub winner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Ordered by position.
    pub participants: Vec<BattleParticipant>,
}

impl Battle {
    pub fn new(box_id: Uuid, max_players: u32, total_rounds: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            box_id,
            max_players,
            total_rounds,
            status: BattleStatus::Waiting,
            winner_id: None,
            created_at: Utc::now(),
            participants: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.max_players
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }
}

/// Durable fact for one participant's draw in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub battle_id: Uuid,
    pub round: u32,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub rarity: Rarity,
    pub value: u64,
    pub created_at: DateTime<Utc>,
}

impl RoundRecord {
    pub fn new(battle_id: Uuid, round: u32, user_id: Uuid, item: &Item) -> Self {
        Self {
            battle_id,
            round,
            user_id,
            item_id: item.id,
            item_name: item.name.clone(),
            rarity: item.rarity,
            value: item.value,
            created_at: Utc::now(),
        }
    }

    pub fn award(&self) -> RoundAward {
        RoundAward {
            round: self.round,
            item_id: self.item_id,
            item_name: self.item_name.clone(),
            rarity: self.rarity,
            value: self.value,
        }
    }
}

/// Newest-first draw history for one user, as consumed by the selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawHistory {
    pub recent_item_ids: Vec<Uuid>,
    pub boxes_since_rare_or_better: u32,
}

impl DrawHistory {
    pub fn new(recent_item_ids: Vec<Uuid>, boxes_since_rare_or_better: u32) -> Self {
        Self {
            recent_item_ids,
            boxes_since_rare_or_better,
        }
    }

    /// Build from newest-first `(item_id, rarity)` pairs, keeping `window` recent ids.
    pub fn from_openings(openings: &[(Uuid, Rarity)], window: usize) -> Self {
        Self {
            recent_item_ids: openings.iter().take(window).map(|(id, _)| *id).collect(),
            boxes_since_rare_or_better: count_since_rare_or_better(
                openings.iter().map(|(_, rarity)| *rarity),
            ),
        }
    }
}

/// Consecutive newest openings below epic, stopping at the first epic+ hit.
pub fn count_since_rare_or_better(newest_first: impl IntoIterator<Item = Rarity>) -> u32 {
    newest_first
        .into_iter()
        .take_while(|rarity| !rarity.is_rare_or_better())
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_parsing() {
        assert_eq!("Epic".parse::<Rarity>().unwrap(), Rarity::Epic);
        assert_eq!("shiny".parse::<Rarity>().unwrap(), Rarity::Unrecognized);
        assert_eq!(Rarity::Unrecognized.base_weight(), 1000);

        let parsed: Rarity = serde_json::from_str("\"golden\"").unwrap();
        assert_eq!(parsed, Rarity::Unrecognized);
    }

    #[test]
    fn test_since_rare_counter() {
        let history = [
            Rarity::Common,
            Rarity::Rare,
            Rarity::Common,
            Rarity::Legendary,
            Rarity::Common,
        ];
        assert_eq!(count_since_rare_or_better(history), 3);
        assert_eq!(count_since_rare_or_better([Rarity::Mythical]), 0);
        assert_eq!(count_since_rare_or_better(Vec::new()), 0);
        assert_eq!(count_since_rare_or_better([Rarity::Common; 7]), 7);
    }

    #[test]
    fn test_history_window() {
        let openings: Vec<(Uuid, Rarity)> = (0..15)
            .map(|_| (Uuid::new_v4(), Rarity::Common))
            .collect();
        let history = DrawHistory::from_openings(&openings, 10);

        assert_eq!(history.recent_item_ids.len(), 10);
        assert_eq!(history.recent_item_ids[0], openings[0].0);
        assert_eq!(history.boxes_since_rare_or_better, 15);
    }

    #[test]
    fn test_participant_totals_accumulate() {
        let mut participant = BattleParticipant::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        let item = Item::new("Sticker", Rarity::Common, 10_000, 150);
        let record = RoundRecord::new(participant.battle_id, 1, participant.user_id, &item);

        participant.award(record.award());
        participant.award(record.award());

        assert_eq!(participant.total_value, 300);
        assert_eq!(participant.awards.len(), 2);
        assert_eq!(participant.last_award().unwrap().item_id, item.id);
    }
}
