//! Case battles.
//!
//! A battle moves `waiting -> active -> finished`. Once it fills (or is
//! started explicitly) a driver task owns it: after `start_delay` it runs one
//! round at a time, `round_delay` apart, then settles the winner. Each round
//! holds the battle's state lock from `round_starting` until
//! `round_completed`, so a force-stop lands between rounds and the aborted
//! driver never runs another one.

pub mod events;
pub mod state;

pub use events::BattleEvent;
pub use state::{BattleState, RankingEntry, RoundResult, RoundSummary, Standing};

use crate::fanout::{Connection, ConnectionId, EventFanout};
use crate::opening::{load_box, load_history};
use crate::selector::OutcomeSelector;
use crate::{EngineError, Result};
use boxbattle_core::{
    Battle, BattleParticipant, BattleStatus, BoxBattleError, EngineConfig, LootStore,
    MysteryBox, RoundRecord,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

const MAX_PLAYERS: std::ops::RangeInclusive<u32> = 2..=8;

type SharedState = Arc<tokio::sync::Mutex<BattleState>>;

/// Registry slot. `state` is empty while the battle is starting or a
/// waiting battle is being stopped.
struct ActiveBattle {
    state: Option<SharedState>,
    driver: Option<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn LootStore>,
    selector: OutcomeSelector,
    fanout: Arc<EventFanout>,
    config: EngineConfig,
    active: Mutex<HashMap<Uuid, ActiveBattle>>,
}

/// Owns every running battle and its driver task.
#[derive(Clone)]
pub struct BattleOrchestrator {
    inner: Arc<Inner>,
}

impl BattleOrchestrator {
    pub fn new(
        store: Arc<dyn LootStore>,
        selector: OutcomeSelector,
        fanout: Arc<EventFanout>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                selector,
                fanout,
                config,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn fanout(&self) -> &Arc<EventFanout> {
        &self.inner.fanout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Persist a waiting battle. Omitted limits fall back to the configured defaults.
    pub async fn create_battle(
        &self,
        box_id: Uuid,
        max_players: Option<u32>,
        total_rounds: Option<u32>,
    ) -> Result<Battle> {
        let config = &self.inner.config;
        let max_players = max_players.unwrap_or(config.default_max_players);
        let total_rounds = total_rounds.unwrap_or(config.default_total_rounds);

        if !MAX_PLAYERS.contains(&max_players) {
            return Err(EngineError::InvalidInput(format!(
                "Max players must be between {} and {}",
                MAX_PLAYERS.start(),
                MAX_PLAYERS.end()
            )));
        }
        if total_rounds == 0 {
            return Err(EngineError::InvalidInput(
                "Total rounds must be greater than 0".into(),
            ));
        }

        let mystery_box = load_box(self.inner.store.as_ref(), box_id).await?;
        if mystery_box.items.is_empty() {
            return Err(EngineError::EmptyBox(box_id));
        }

        let battle = Battle::new(box_id, max_players, total_rounds);
        self.inner.store.create_battle(&battle).await?;

        tracing::info!(
            battle_id = %battle.id,
            box_id = %box_id,
            max_players,
            total_rounds,
            "Created battle"
        );
        Ok(battle)
    }

    /// Add a user to a waiting battle. The battle starts once it is full.
    pub async fn join(&self, battle_id: Uuid, user_id: Uuid) -> Result<BattleParticipant> {
        let store = &self.inner.store;
        let battle = store
            .get_battle(battle_id)
            .await
            .map_err(|e| battle_error(battle_id, e))?;

        if battle.has_participant(user_id) {
            return Err(EngineError::AlreadyJoined(user_id));
        }
        if battle.status != BattleStatus::Waiting {
            return Err(EngineError::InvalidState(format!(
                "Battle {} is {}",
                battle_id, battle.status
            )));
        }
        if battle.is_full() {
            return Err(EngineError::BattleFull);
        }

        let participant = store
            .add_participant(battle_id, user_id)
            .await
            .map_err(|e| battle_error(battle_id, e))?;

        tracing::info!(
            battle_id = %battle_id,
            user_id = %user_id,
            position = participant.position,
            "Joined battle"
        );

        if participant.position >= battle.max_players {
            self.start(battle_id).await?;
        }
        Ok(participant)
    }

    /// Activate a waiting battle and hand it to a driver task.
    pub async fn start(&self, battle_id: Uuid) -> Result<BattleState> {
        {
            let mut active = self.inner.active.lock();
            if active.contains_key(&battle_id) {
                return Err(EngineError::InvalidState(format!(
                    "Battle {} is already running or being stopped",
                    battle_id
                )));
            }
            active.insert(
                battle_id,
                ActiveBattle {
                    state: None,
                    driver: None,
                },
            );
        }

        match self.prepare(battle_id).await {
            Ok((state, mystery_box)) => Ok(self.launch(state, mystery_box)),
            Err(e) => {
                self.inner.active.lock().remove(&battle_id);
                Err(e)
            }
        }
    }

    async fn prepare(&self, battle_id: Uuid) -> Result<(BattleState, Arc<MysteryBox>)> {
        let store = &self.inner.store;
        let battle = store
            .get_battle(battle_id)
            .await
            .map_err(|e| battle_error(battle_id, e))?;

        if battle.status != BattleStatus::Waiting {
            return Err(EngineError::InvalidState(format!(
                "Battle {} is {}",
                battle_id, battle.status
            )));
        }
        if battle.participants.is_empty() {
            return Err(EngineError::InvalidState(format!(
                "Battle {} has no participants",
                battle_id
            )));
        }

        let mystery_box = load_box(store.as_ref(), battle.box_id).await?;
        if mystery_box.items.is_empty() {
            return Err(EngineError::EmptyBox(battle.box_id));
        }

        store
            .update_battle_status(battle_id, BattleStatus::Active, None)
            .await
            .map_err(|e| battle_error(battle_id, e))?;

        Ok((BattleState::from_battle(&battle), Arc::new(mystery_box)))
    }

    fn launch(&self, state: BattleState, mystery_box: Arc<MysteryBox>) -> BattleState {
        let battle_id = state.battle_id;
        let snapshot = state.clone();

        tracing::info!(
            battle_id = %battle_id,
            participants = state.participants.len(),
            total_rounds = state.total_rounds,
            "Battle started"
        );
        self.inner.fanout.broadcast(
            battle_id,
            &BattleEvent::BattleStarted {
                battle_id,
                total_rounds: state.total_rounds,
                participants: state.participants.clone(),
            },
        );

        let shared: SharedState = Arc::new(tokio::sync::Mutex::new(state));
        let mut active = self.inner.active.lock();
        if let Some(entry) = active.get_mut(&battle_id) {
            entry.state = Some(shared.clone());
            entry.driver = Some(tokio::spawn(drive(
                self.inner.clone(),
                shared,
                mystery_box,
            )));
        }
        snapshot
    }

    /// Stop a waiting or running battle without settling a winner.
    pub async fn force_stop(&self, battle_id: Uuid, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let slot = {
            let mut active = self.inner.active.lock();
            match active.get(&battle_id) {
                Some(entry) => Some(entry.state.clone()),
                None => {
                    active.insert(
                        battle_id,
                        ActiveBattle {
                            state: None,
                            driver: None,
                        },
                    );
                    None
                }
            }
        };

        match slot {
            Some(None) => {
                return Err(EngineError::InvalidState(format!(
                    "Battle {} is starting or stopping",
                    battle_id
                )));
            }
            Some(Some(shared)) => {
                let mut state = shared.lock().await;
                if state.is_finished() {
                    return Err(EngineError::InvalidState(format!(
                        "Battle {} is already finished",
                        battle_id
                    )));
                }
                self.inner
                    .store
                    .update_battle_status(battle_id, BattleStatus::Finished, None)
                    .await
                    .map_err(|e| battle_error(battle_id, e))?;
                state.status = BattleStatus::Finished;

                let entry = self.inner.active.lock().remove(&battle_id);
                if let Some(driver) = entry.and_then(|entry| entry.driver) {
                    driver.abort();
                }
            }
            None => {
                // The reserved slot keeps `start` out until the stored status is final.
                let stopped = self.stop_waiting(battle_id).await;
                self.inner.active.lock().remove(&battle_id);
                stopped?;
            }
        }

        tracing::info!(battle_id = %battle_id, reason = %reason, "Battle force-stopped");
        self.inner
            .fanout
            .broadcast(battle_id, &BattleEvent::BattleForceStopped { battle_id, reason });
        Ok(())
    }

    async fn stop_waiting(&self, battle_id: Uuid) -> Result<()> {
        let store = &self.inner.store;
        let battle = store
            .get_battle(battle_id)
            .await
            .map_err(|e| battle_error(battle_id, e))?;
        if battle.status == BattleStatus::Finished {
            return Err(EngineError::InvalidState(format!(
                "Battle {} is already finished",
                battle_id
            )));
        }
        store
            .update_battle_status(battle_id, BattleStatus::Finished, None)
            .await
            .map_err(|e| battle_error(battle_id, e))
    }

    /// Snapshot of a running battle. Waits for an in-flight round to complete.
    pub async fn current_state(&self, battle_id: Uuid) -> Option<BattleState> {
        let shared = self.live_state(battle_id)?;
        let state = shared.lock().await;
        Some(state.clone())
    }

    pub fn active_battles(&self) -> Vec<Uuid> {
        self.inner.active.lock().keys().copied().collect()
    }

    /// Register a subscriber and send it the current snapshot.
    pub async fn subscribe(&self, battle_id: Uuid, connection: Connection) {
        let fanout = &self.inner.fanout;
        match self.live_state(battle_id) {
            Some(shared) => {
                let state = shared.lock().await;
                fanout.send_to(&connection, &BattleEvent::BattleState(Some(state.clone())));
                fanout.subscribe(battle_id, connection);
            }
            None => {
                fanout.send_to(&connection, &BattleEvent::BattleState(None));
                fanout.subscribe(battle_id, connection);
            }
        }
    }

    pub fn unsubscribe(&self, battle_id: Uuid, connection_id: ConnectionId) {
        self.inner.fanout.unsubscribe(battle_id, connection_id);
    }

    fn live_state(&self, battle_id: Uuid) -> Option<SharedState> {
        self.inner
            .active
            .lock()
            .get(&battle_id)
            .and_then(|entry| entry.state.clone())
    }
}

fn battle_error(battle_id: Uuid, error: BoxBattleError) -> EngineError {
    match error {
        BoxBattleError::NotFound(_) => EngineError::BattleNotFound(battle_id),
        BoxBattleError::InvalidState(msg) => EngineError::InvalidState(msg),
        other => EngineError::Core(other),
    }
}

async fn drive(inner: Arc<Inner>, shared: SharedState, mystery_box: Arc<MysteryBox>) {
    tokio::time::sleep(inner.config.start_delay).await;

    loop {
        let mut state = shared.lock().await;
        if state.is_finished() {
            return;
        }

        if state.current_round >= state.total_rounds {
            inner.finish(&mut state).await;
            return;
        }

        state.current_round += 1;
        inner.fanout.broadcast(
            state.battle_id,
            &BattleEvent::RoundStarting {
                battle_id: state.battle_id,
                round: state.current_round,
                total_rounds: state.total_rounds,
            },
        );
        inner.run_round(&mut state, &mystery_box).await;
        drop(state);

        tokio::time::sleep(inner.config.round_delay).await;
    }
}

impl Inner {
    async fn run_round(&self, state: &mut BattleState, mystery_box: &MysteryBox) {
        let battle_id = state.battle_id;
        let round = state.current_round;

        let users: Vec<Uuid> = state.active_participants().map(|p| p.user_id).collect();
        let draws = join_all(
            users
                .iter()
                .map(|user_id| self.draw(battle_id, round, *user_id, mystery_box)),
        )
        .await;

        let mut results = Vec::with_capacity(users.len());
        for (user_id, outcome) in users.into_iter().zip(draws) {
            match outcome {
                Ok(record) => {
                    let award = record.award();
                    state.apply_award(user_id, award.clone());
                    results.push(RoundResult { user_id, award });
                }
                Err(e) => {
                    tracing::warn!(
                        battle_id = %battle_id,
                        user_id = %user_id,
                        round,
                        "Skipping participant for round: {}",
                        e
                    );
                }
            }
        }

        state.round_history.push(RoundSummary {
            round,
            results: results.clone(),
        });

        tracing::info!(
            battle_id = %battle_id,
            round,
            draws = results.len(),
            "Round completed"
        );
        self.fanout.broadcast(
            battle_id,
            &BattleEvent::RoundCompleted {
                battle_id,
                round,
                results,
                standings: state.standings(),
            },
        );
    }

    async fn draw(
        &self,
        battle_id: Uuid,
        round: u32,
        user_id: Uuid,
        mystery_box: &MysteryBox,
    ) -> Result<RoundRecord> {
        let history = load_history(self.store.as_ref(), user_id, self.config.history_window).await?;
        let item = self.selector.select(mystery_box, &history)?;
        let record = RoundRecord::new(battle_id, round, user_id, item);
        self.store.record_round(&record).await?;
        Ok(record)
    }

    async fn finish(&self, state: &mut BattleState) {
        let battle_id = state.battle_id;
        state.winner_id = state.winner();
        state.status = BattleStatus::Finished;

        if let Err(e) = self
            .store
            .update_battle_status(battle_id, BattleStatus::Finished, state.winner_id)
            .await
        {
            tracing::error!(battle_id = %battle_id, "Failed to persist battle result: {}", e);
        }

        tracing::info!(
            battle_id = %battle_id,
            winner_id = ?state.winner_id,
            "Battle finished"
        );
        self.fanout.broadcast(
            battle_id,
            &BattleEvent::BattleFinished {
                battle_id,
                winner_id: state.winner_id,
                ranking: state.ranking(),
            },
        );

        self.active.lock().remove(&battle_id);
    }
}
