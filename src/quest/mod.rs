//! Quest System Module
//!
//! Quests are ordered or parallel sequences of stages, optionally locked to
//! an area. Stages live in a shared stage graph; stage-link rewards attach
//! floating stages to a quest at runtime to implement branching.

pub mod definition;
pub mod events;
pub mod graph;
pub mod progress;
pub mod registry;
pub mod reward;
pub mod stage;
pub mod state;
pub mod task;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use definition::Quest;
pub use events::{ProgressUpdate, QuestEvent};
pub use graph::{Attachment, StageGraph};
pub use registry::QuestRegistry;
pub use reward::{Reward, RewardContext, RewardWrapper, StageLinkReward};
pub use stage::{Stage, TaskWrapper};
pub use state::{BranchState, QuestRun, RunStatus, StageProgress, TaskProgress};
pub use task::{Task, TaskHandler};

/// Unique identifier of a quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestId(pub Uuid);

impl QuestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a stage node in the stage graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub Uuid);

impl StageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
