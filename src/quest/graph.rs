//! Stage Graph
//!
//! Every stage lives in one arena keyed by [`StageId`]. Quests refer to their
//! stages by id. A reverse index records where each stage is attached, so a
//! stage is floating exactly when it has no entry in that index.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use super::definition::Quest;
use super::stage::Stage;
use super::{QuestId, StageId};
use crate::error::QuestError;

/// Where a stage is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    /// Part of the quest's authored sequence at `position`
    Authored { quest: QuestId, position: usize },
    /// Linked into the quest at runtime by a stage-link reward
    Linked { quest: QuestId },
}

impl Attachment {
    pub fn quest(&self) -> QuestId {
        match self {
            Attachment::Authored { quest, .. } | Attachment::Linked { quest } => *quest,
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attachment::Authored { quest, position } => {
                write!(f, "stage {} of quest {}", position + 1, quest)
            }
            Attachment::Linked { quest } => write!(f, "linked into quest {}", quest),
        }
    }
}

#[derive(Debug, Default)]
pub struct StageGraph {
    stages: HashMap<StageId, Stage>,
    attachments: HashMap<StageId, Attachment>,
    /// Linked stages per quest, in link order
    linked: HashMap<QuestId, Vec<StageId>>,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage node. New stages are floating.
    pub fn insert(&mut self, stage: Stage) -> Result<(), QuestError> {
        if self.stages.contains_key(&stage.id) {
            return Err(QuestError::DuplicateStage(stage.id));
        }
        self.stages.insert(stage.id, stage);
        Ok(())
    }

    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(&id)
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values()
    }

    pub fn attachment(&self, id: StageId) -> Option<Attachment> {
        self.attachments.get(&id).copied()
    }

    /// A stage is floating when no quest refers to it
    pub fn is_floating(&self, id: StageId) -> bool {
        self.stages.contains_key(&id) && !self.attachments.contains_key(&id)
    }

    pub fn floating(&self) -> Vec<StageId> {
        let mut floating: Vec<StageId> = self
            .stages
            .keys()
            .filter(|id| !self.attachments.contains_key(id))
            .copied()
            .collect();
        floating.sort();
        floating
    }

    /// Attach a quest's authored sequence. Either every stage attaches or
    /// nothing changes.
    pub fn attach_authored(&mut self, quest: QuestId, stages: &[StageId]) -> Result<(), QuestError> {
        for (position, id) in stages.iter().enumerate() {
            if !self.stages.contains_key(id) {
                return Err(QuestError::StageNotFound(*id));
            }
            if let Some(attachment) = self.attachments.get(id) {
                return Err(QuestError::StageAlreadyAttached {
                    stage: *id,
                    attachment: *attachment,
                });
            }
            if stages[..position].contains(id) {
                return Err(QuestError::DuplicateStage(*id));
            }
        }

        for (position, id) in stages.iter().enumerate() {
            self.attachments
                .insert(*id, Attachment::Authored { quest, position });
        }
        Ok(())
    }

    /// Attach a floating stage to `quest`. Attaching a stage that is already
    /// attached anywhere fails and leaves the graph unchanged.
    pub fn link(&mut self, quest: QuestId, stage: StageId) -> Result<(), QuestError> {
        if !self.stages.contains_key(&stage) {
            return Err(QuestError::StageNotFound(stage));
        }
        if let Some(attachment) = self.attachments.get(&stage) {
            return Err(QuestError::StageAlreadyAttached {
                stage,
                attachment: *attachment,
            });
        }

        self.attachments.insert(stage, Attachment::Linked { quest });
        self.linked.entry(quest).or_default().push(stage);
        Ok(())
    }

    pub fn linked_stages(&self, quest: QuestId) -> &[StageId] {
        self.linked.get(&quest).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Authored stages of the quest followed by its linked stages
    pub fn quest_stages(&self, quest: &Quest) -> Vec<StageId> {
        quest
            .stages()
            .iter()
            .chain(self.linked_stages(quest.id()))
            .copied()
            .collect()
    }

    /// The authored stage after `stage`, if `stage` is authored in `quest`
    pub fn next_authored(&self, quest: &Quest, stage: StageId) -> Option<StageId> {
        match self.attachment(stage)? {
            Attachment::Authored { quest: owner, position } if owner == quest.id() => {
                quest.stages().get(position + 1).copied()
            }
            _ => None,
        }
    }
}
