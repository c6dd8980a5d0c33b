use super::state::{BattleState, RankingEntry, RoundResult, Standing};
use boxbattle_core::BattleParticipant;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames pushed to battle subscribers, serialized as `{"event", "data"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BattleEvent {
    /// Snapshot sent on subscribe. `null` when the battle is not running.
    BattleState(Option<BattleState>),
    BattleStarted {
        battle_id: Uuid,
        total_rounds: u32,
        participants: Vec<BattleParticipant>,
    },
    RoundStarting {
        battle_id: Uuid,
        round: u32,
        total_rounds: u32,
    },
    RoundCompleted {
        battle_id: Uuid,
        round: u32,
        results: Vec<RoundResult>,
        standings: Vec<Standing>,
    },
    BattleFinished {
        battle_id: Uuid,
        winner_id: Option<Uuid>,
        ranking: Vec<RankingEntry>,
    },
    BattleForceStopped {
        battle_id: Uuid,
        reason: String,
    },
}

impl BattleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BattleEvent::BattleState(_) => "battle_state",
            BattleEvent::BattleStarted { .. } => "battle_started",
            BattleEvent::RoundStarting { .. } => "round_starting",
            BattleEvent::RoundCompleted { .. } => "round_completed",
            BattleEvent::BattleFinished { .. } => "battle_finished",
            BattleEvent::BattleForceStopped { .. } => "battle_force_stopped",
        }
    }

    /// Whether no further events follow for the battle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BattleEvent::BattleFinished { .. } | BattleEvent::BattleForceStopped { .. }
        )
    }
}
