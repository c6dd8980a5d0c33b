use super::boxes::resolve_box;
use boxbattle_core::{EngineConfig, LootStore};
use boxbattle_engine::{
    BattleEvent, BattleOrchestrator, Connection, EngineError, EventFanout, OutcomeSelector, Result,
};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Args)]
pub struct BattleArgs {
    /// Box id (a fresh demo box when omitted)
    #[arg(short, long)]
    pub box_id: Option<String>,
    /// Number of players
    #[arg(short, long)]
    pub players: Option<u32>,
    /// Number of rounds
    #[arg(short, long)]
    pub rounds: Option<u32>,
    /// Skip the delays between rounds
    #[arg(long)]
    pub fast: bool,
    /// Print raw event frames instead of tables
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_battle(
    args: BattleArgs,
    store: Arc<dyn LootStore>,
    mut config: EngineConfig,
) -> Result<()> {
    if args.fast {
        config.start_delay = Duration::ZERO;
        config.round_delay = Duration::ZERO;
    }

    let box_id = resolve_box(store.as_ref(), args.box_id).await?;
    let orchestrator = BattleOrchestrator::new(
        store,
        OutcomeSelector::new(),
        Arc::new(EventFanout::new()),
        config,
    );

    let battle = orchestrator
        .create_battle(box_id, args.players, args.rounds)
        .await?;
    println!(
        "Battle {} ({} players, {} rounds)",
        battle.id, battle.max_players, battle.total_rounds
    );

    let (connection, mut frames) = Connection::new();
    orchestrator.subscribe(battle.id, connection).await;

    for _ in 0..battle.max_players {
        orchestrator.join(battle.id, Uuid::new_v4()).await?;
    }

    while let Some(frame) = frames.recv().await {
        if args.json {
            println!("{}", frame);
        }
        let event: BattleEvent = serde_json::from_str(&frame)
            .map_err(|e| EngineError::Internal(format!("Unreadable event frame: {}", e)))?;
        if !args.json {
            print_event(&event);
        }
        if event.is_terminal() {
            break;
        }
    }
    Ok(())
}

fn short(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn print_event(event: &BattleEvent) {
    match event {
        BattleEvent::BattleState(_) => {}
        BattleEvent::BattleStarted { participants, .. } => {
            println!("Battle started with {} players", participants.len());
        }
        BattleEvent::RoundStarting {
            round,
            total_rounds,
            ..
        } => {
            println!();
            println!("Round {}/{}", round, total_rounds);
        }
        BattleEvent::RoundCompleted { standings, .. } => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Player", "Item", "Rarity", "Value", "Total"]);
            for standing in standings {
                let (item, rarity, value) = match &standing.last_award {
                    Some(award) => (
                        award.item_name.clone(),
                        award.rarity.to_string(),
                        award.value.to_string(),
                    ),
                    None => ("-".into(), "-".into(), "-".into()),
                };
                table.add_row(vec![
                    short(&standing.user_id),
                    item,
                    rarity,
                    value,
                    standing.total_value.to_string(),
                ]);
            }
            println!("{}", table);
        }
        BattleEvent::BattleFinished {
            winner_id, ranking, ..
        } => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Rank", "Player", "Total"]);
            for entry in ranking {
                table.add_row(vec![
                    entry.rank.to_string(),
                    short(&entry.user_id),
                    entry.total_value.to_string(),
                ]);
            }
            println!();
            println!("Battle finished");
            println!("{}", table);
            if let Some(winner) = winner_id {
                println!("Winner: {}", winner);
            }
        }
        BattleEvent::BattleForceStopped { reason, .. } => {
            println!("Battle stopped: {}", reason);
        }
    }
}
