use boxbattle_core::ErrorKind;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Core error: {0}")]
    Core(#[from] boxbattle_core::BoxBattleError),

    #[error("Battle not found: {0}")]
    BattleNotFound(Uuid),

    #[error("Box not found: {0}")]
    BoxNotFound(Uuid),

    #[error("Box {0} has no items")]
    EmptyBox(Uuid),

    #[error("Invalid battle state: {0}")]
    InvalidState(String),

    #[error("Battle is full")]
    BattleFull,

    #[error("User already joined: {0}")]
    AlreadyJoined(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::BattleNotFound(_) | Self::BoxNotFound(_) | Self::EmptyBox(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidState(_) | Self::BattleFull | Self::AlreadyJoined(_) => {
                ErrorKind::InvalidState
            }
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Internal(_) => ErrorKind::TransientIo,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxbattle_core::BoxBattleError;

    #[test]
    fn test_taxonomy() {
        assert_eq!(EngineError::EmptyBox(Uuid::nil()).kind(), ErrorKind::NotFound);
        assert_eq!(EngineError::BattleFull.kind(), ErrorKind::InvalidState);
        assert!(EngineError::from(BoxBattleError::transient("disk")).is_transient());
        assert_eq!(
            EngineError::from(BoxBattleError::not_found("battle")).kind(),
            ErrorKind::NotFound
        );
    }
}
