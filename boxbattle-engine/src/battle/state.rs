use boxbattle_core::{Battle, BattleParticipant, BattleStatus, RoundAward};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One participant's draw in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub user_id: Uuid,
    pub award: RoundAward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub results: Vec<RoundResult>,
}

/// Running total and latest award of a participant, as published after a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: Uuid,
    pub position: u32,
    pub total_value: u64,
    pub last_award: Option<RoundAward>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-based place.
    pub rank: u32,
    pub user_id: Uuid,
    pub position: u32,
    pub total_value: u64,
}

/// Live view of a running battle. Exists from start until finish or force-stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub battle_id: Uuid,
    pub box_id: Uuid,
    pub current_round: u32,
    pub total_rounds: u32,
    pub status: BattleStatus,
    pub participants: Vec<BattleParticipant>,
    pub winner_id: Option<Uuid>,
    pub round_history: Vec<RoundSummary>,
}

impl BattleState {
    /// Fresh active state from a durable battle, participants in position order.
    pub fn from_battle(battle: &Battle) -> Self {
        let mut participants = battle.participants.clone();
        participants.sort_by_key(|p| p.position);

        Self {
            battle_id: battle.id,
            box_id: battle.box_id,
            current_round: 0,
            total_rounds: battle.total_rounds,
            status: BattleStatus::Active,
            participants,
            winner_id: None,
            round_history: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == BattleStatus::Finished
    }

    /// Participants still drawing.
    pub fn active_participants(&self) -> impl Iterator<Item = &BattleParticipant> {
        self.participants.iter().filter(|p| !p.is_eliminated)
    }

    /// Strictly greatest total; the earliest participant wins ties.
    pub fn winner(&self) -> Option<Uuid> {
        let mut best: Option<&BattleParticipant> = None;
        for participant in &self.participants {
            match best {
                Some(current) if participant.total_value <= current.total_value => {}
                _ => best = Some(participant),
            }
        }
        best.map(|p| p.user_id)
    }

    /// Participants by descending total. Ties keep position order.
    pub fn ranking(&self) -> Vec<RankingEntry> {
        let mut ordered: Vec<&BattleParticipant> = self.participants.iter().collect();
        ordered.sort_by(|a, b| b.total_value.cmp(&a.total_value));

        ordered
            .into_iter()
            .enumerate()
            .map(|(index, p)| RankingEntry {
                rank: index as u32 + 1,
                user_id: p.user_id,
                position: p.position,
                total_value: p.total_value,
            })
            .collect()
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.participants
            .iter()
            .map(|p| Standing {
                user_id: p.user_id,
                position: p.position,
                total_value: p.total_value,
                last_award: p.last_award().cloned(),
            })
            .collect()
    }

    /// Fold a successful draw into the participant's running total.
    pub(crate) fn apply_award(&mut self, user_id: Uuid, award: RoundAward) -> bool {
        match self.participants.iter_mut().find(|p| p.user_id == user_id) {
            Some(participant) => {
                participant.award(award);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxbattle_core::Rarity;

    fn state_with_totals(totals: &[u64]) -> BattleState {
        let mut battle = Battle::new(Uuid::new_v4(), totals.len() as u32, 1);
        for (index, total) in totals.iter().enumerate() {
            let mut participant =
                BattleParticipant::new(battle.id, Uuid::new_v4(), index as u32 + 1);
            participant.total_value = *total;
            battle.participants.push(participant);
        }
        BattleState::from_battle(&battle)
    }

    #[test]
    fn test_winner_prefers_first_on_tie() {
        let state = state_with_totals(&[10, 25, 25, 5]);
        assert_eq!(state.winner(), Some(state.participants[1].user_id));

        let state = state_with_totals(&[0, 0]);
        assert_eq!(state.winner(), Some(state.participants[0].user_id));

        assert_eq!(state_with_totals(&[]).winner(), None);
    }

    #[test]
    fn test_ranking_is_descending_and_stable() {
        let state = state_with_totals(&[10, 25, 25, 5]);
        let ranking = state.ranking();

        let totals: Vec<u64> = ranking.iter().map(|r| r.total_value).collect();
        assert_eq!(totals, vec![25, 25, 10, 5]);
        let positions: Vec<u32> = ranking.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![2, 3, 1, 4]);
        let ranks: Vec<u32> = ranking.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_from_battle_orders_by_position() {
        let mut battle = Battle::new(Uuid::new_v4(), 2, 3);
        battle
            .participants
            .push(BattleParticipant::new(battle.id, Uuid::new_v4(), 2));
        battle
            .participants
            .push(BattleParticipant::new(battle.id, Uuid::new_v4(), 1));

        let state = BattleState::from_battle(&battle);
        assert_eq!(state.participants[0].position, 1);
        assert_eq!(state.current_round, 0);
        assert_eq!(state.status, BattleStatus::Active);
        assert!(state.winner_id.is_none());
    }

    #[test]
    fn test_apply_award() {
        let mut state = state_with_totals(&[0, 0]);
        let user = state.participants[1].user_id;
        let award = RoundAward {
            round: 1,
            item_id: Uuid::new_v4(),
            item_name: "Knife".into(),
            rarity: Rarity::Legendary,
            value: 900,
        };

        assert!(state.apply_award(user, award.clone()));
        assert!(!state.apply_award(Uuid::new_v4(), award));

        let standings = state.standings();
        assert_eq!(standings[1].total_value, 900);
        assert_eq!(standings[1].last_award.as_ref().unwrap().item_name, "Knife");
        assert!(standings[0].last_award.is_none());
    }
}
