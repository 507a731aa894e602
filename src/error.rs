//! Quest Errors
//!
//! Error type shared by the progression graph, the quest handler and the
//! extension factory.

use thiserror::Error;

use crate::quest::graph::Attachment;
use crate::quest::{QuestId, StageId};

/// Errors raised by quest operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestError {
    /// No quest with this id is loaded
    #[error("Quest not found: {0}")]
    QuestNotFound(QuestId),

    /// No stage with this id exists in the stage graph
    #[error("Stage not found: {0}")]
    StageNotFound(StageId),

    /// A stage id was declared twice
    #[error("Stage {0} is declared more than once")]
    DuplicateStage(StageId),

    /// Only floating stages can be attached to a quest
    #[error("Stage {stage} is already attached ({attachment})")]
    StageAlreadyAttached { stage: StageId, attachment: Attachment },

    /// Quest is hidden or broken
    #[error("Quest {0} is not available")]
    QuestUnavailable(QuestId),

    /// Player already has this quest running
    #[error("Quest {0} is already active")]
    AlreadyActive(QuestId),

    /// Player completed this quest and it cannot be replayed
    #[error("Quest {0} is not replayable")]
    NotReplayable(QuestId),

    /// Player has no running instance of this quest
    #[error("Quest {0} is not active")]
    NotActive(QuestId),

    /// Quest is area-locked but has no area
    #[error("Quest {0} is area-locked but has no area")]
    AreaMissing(QuestId),

    /// No task or reward kind registered under this identifier
    #[error("Unknown extension '{0}'")]
    UnknownExtension(String),

    /// Quest file could not be resolved
    #[error("Invalid quest definition: {0}")]
    InvalidDefinition(String),
}

impl QuestError {
    /// Configuration errors come from authored data. They are logged and
    /// turned into a broken or no-op result rather than surfaced to players.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            QuestError::StageAlreadyAttached { .. }
                | QuestError::DuplicateStage(_)
                | QuestError::AreaMissing(_)
                | QuestError::UnknownExtension(_)
                | QuestError::InvalidDefinition(_)
                | QuestError::StageNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        let quest = QuestId::new();
        assert!(QuestError::AreaMissing(quest).is_configuration());
        assert!(QuestError::UnknownExtension("teleport".to_string()).is_configuration());
        assert!(!QuestError::AlreadyActive(quest).is_configuration());
        assert!(!QuestError::QuestNotFound(quest).is_configuration());
    }
}
