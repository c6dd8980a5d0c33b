//! Draw and battle engine for mystery boxes
//!
//! Weighted item selection with duplicate protection and pity, single box
//! openings, timer-driven case battles with live event fan-out, and
//! commit-reveal fairness proofs.

pub mod battle;
pub mod error;
pub mod fairness;
pub mod fanout;
pub mod opening;
pub mod selector;

pub use battle::{BattleEvent, BattleOrchestrator, BattleState, RankingEntry};
pub use error::{EngineError, Result};
pub use fanout::{Connection, ConnectionId, EventFanout};
pub use opening::{BoxOpener, OpeningOutcome};
pub use selector::{OsRandom, OutcomeSelector, RandomSource, TableReport};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::selector::{RandomSource, DRAW_SCALE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always returns the same roll.
    pub struct FixedRandom(u32);

    impl FixedRandom {
        pub fn new(roll: u32) -> Self {
            Self(roll % DRAW_SCALE)
        }
    }

    impl RandomSource for FixedRandom {
        fn roll(&self) -> u32 {
            self.0
        }
    }

    /// Cycles through a fixed list of rolls.
    pub struct SequenceRandom {
        rolls: Vec<u32>,
        next: AtomicUsize,
    }

    impl SequenceRandom {
        pub fn new(rolls: Vec<u32>) -> Self {
            Self {
                rolls,
                next: AtomicUsize::new(0),
            }
        }
    }

    impl RandomSource for SequenceRandom {
        fn roll(&self) -> u32 {
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            self.rolls.get(index % self.rolls.len().max(1)).copied().unwrap_or(0)
        }
    }
}
