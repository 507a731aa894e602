//! Quest Definition Structures
//!
//! Raw structures are deserialized from TOML quest files and resolved into a
//! [`Quest`] plus the stage nodes it declares.

use std::hash::{Hash, Hasher};

use serde::Deserialize;
use serde_json::Value;

use super::graph::StageGraph;
use super::reward::RewardWrapper;
use super::stage::{Stage, TaskWrapper};
use super::{QuestId, StageId};
use crate::area::{Area, Location, Region};
use crate::error::QuestError;
use crate::extension::{ExtensionFactory, Settings};

/// A quest definition loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub id: QuestId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Region the quest is played in
    #[serde(default)]
    pub area: Option<Area>,
    /// Progress only counts inside `area`
    #[serde(default)]
    pub area_locked: bool,
    #[serde(default)]
    pub replayable: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Stages unlock one after another instead of all at once
    #[serde(default = "default_sequential")]
    pub sequential: bool,
    /// Authored stage sequence
    #[serde(default)]
    pub stages: Vec<RawStage>,
    /// Stages reachable only through stage-link rewards
    #[serde(default)]
    pub floating_stages: Vec<RawStage>,
    /// Given when the quest completes
    #[serde(default)]
    pub rewards: Vec<RawReward>,
}

fn default_sequential() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStage {
    pub id: StageId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<RawTask>,
    #[serde(default)]
    pub rewards: Vec<RawReward>,
}

/// Raw task; every key besides `id`, `type` and `rewards` is a task setting
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub rewards: Vec<RawReward>,
    #[serde(flatten)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReward {
    #[serde(rename = "type")]
    pub reward_type: String,
    /// Per-use value, e.g. an amount or a stage id
    #[serde(default)]
    pub setting: Value,
    /// Settings handed to the reward at registration
    #[serde(default)]
    pub settings: Settings,
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// Root of a quest's progression graph
#[derive(Debug, Clone)]
pub struct Quest {
    id: QuestId,
    name: String,
    description: String,
    area: Option<Area>,
    stages: Vec<StageId>,
    rewards: Vec<RewardWrapper>,
    area_locked: bool,
    replayable: bool,
    hidden: bool,
    branching: bool,
    sequential: bool,
    broken: bool,
}

impl Quest {
    pub fn new(id: QuestId, name: impl Into<String>, stages: Vec<StageId>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            area: None,
            stages,
            rewards: Vec::new(),
            area_locked: false,
            replayable: false,
            hidden: false,
            branching: false,
            sequential: true,
            broken: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_area(mut self, area: Area) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_area_locked(mut self, area_locked: bool) -> Self {
        self.area_locked = area_locked;
        self
    }

    pub fn with_replayable(mut self, replayable: bool) -> Self {
        self.replayable = replayable;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_reward(mut self, reward: RewardWrapper) -> Self {
        self.rewards.push(reward);
        self
    }

    /// Seed the cached broken flag, as a loader restoring a snapshot would
    pub fn with_broken(mut self, broken: bool) -> Self {
        self.broken = broken;
        self
    }

    pub fn id(&self) -> QuestId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn area(&self) -> Option<&Area> {
        self.area.as_ref()
    }

    /// Authored stage sequence
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    pub fn rewards(&self) -> &[RewardWrapper] {
        &self.rewards
    }

    pub fn is_area_locked(&self) -> bool {
        self.area_locked
    }

    pub fn is_replayable(&self) -> bool {
        self.replayable
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Cached; refreshed by [`Quest::check_broken`]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Cached; refreshed by [`Quest::check_branches`]
    pub fn has_branches(&self) -> bool {
        self.branching
    }

    /// Branching quests always progress one stage at a time
    pub fn is_sequential(&self) -> bool {
        self.sequential || self.branching
    }

    pub fn is_available(&self) -> bool {
        !self.hidden && !self.broken
    }

    /// Stages a new run starts with
    pub fn first_stages(&self) -> Vec<StageId> {
        if self.is_sequential() {
            self.stages.first().copied().into_iter().collect()
        } else {
            self.stages.clone()
        }
    }

    /// Broken state for the current graph. `None` when the quest is
    /// area-locked without an area; the cached flag must then stay as is.
    pub fn evaluate_broken(&self, graph: &StageGraph) -> Option<bool> {
        if self.area_locked && self.area.is_none() {
            return None;
        }
        let stages = graph.quest_stages(self);
        let broken = stages.is_empty()
            || stages
                .iter()
                .any(|id| graph.get(*id).is_none_or(Stage::check_broken))
            || self.rewards.iter().any(|reward| !reward.accepts());
        Some(broken)
    }

    /// Recompute and cache the broken flag
    pub fn check_broken(&mut self, graph: &StageGraph) -> bool {
        if let Some(broken) = self.evaluate_broken(graph) {
            self.broken = broken;
        }
        self.broken
    }

    pub fn evaluate_branches(&self, graph: &StageGraph) -> bool {
        graph
            .quest_stages(self)
            .iter()
            .filter_map(|id| graph.get(*id))
            .any(|stage| stage.has_branching_tasks() || stage.is_branching())
    }

    /// Recompute and cache the branching flag
    pub fn check_branches(&mut self, graph: &StageGraph) -> bool {
        self.branching = self.evaluate_branches(graph);
        self.branching
    }

    /// Whether progress made at `location` counts for this quest
    pub fn allows_progress_at(&self, location: &Location, ignore_height: bool) -> bool {
        if !self.area_locked {
            return true;
        }
        self.area
            .as_ref()
            .is_some_and(|area| area.in_region(location, ignore_height))
    }

    /// Resolve a raw quest. Returns the quest and every stage it declares,
    /// authored stages first, then floating ones.
    pub fn from_raw(raw: RawQuest, factory: &ExtensionFactory) -> Result<(Quest, Vec<Stage>), QuestError> {
        let mut stages = Vec::with_capacity(raw.stages.len() + raw.floating_stages.len());
        for raw_stage in raw.stages.iter().chain(&raw.floating_stages) {
            stages.push(resolve_stage(raw_stage, factory)?);
        }

        let rewards = raw
            .rewards
            .iter()
            .map(|reward| resolve_reward(reward, factory))
            .collect::<Result<Vec<_>, _>>()?;

        let quest = Quest {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            area: raw.area,
            stages: raw.stages.iter().map(|stage| stage.id).collect(),
            rewards,
            area_locked: raw.area_locked,
            replayable: raw.replayable,
            hidden: raw.hidden,
            branching: false,
            sequential: raw.sequential,
            broken: false,
        };

        Ok((quest, stages))
    }
}

fn resolve_stage(raw: &RawStage, factory: &ExtensionFactory) -> Result<Stage, QuestError> {
    let mut stage = Stage::new(raw.id, raw.name.clone()).with_description(raw.description.clone());

    for raw_task in &raw.tasks {
        if stage.task(&raw_task.id).is_some() {
            return Err(QuestError::InvalidDefinition(format!(
                "stage {} declares task '{}' twice",
                raw.id, raw_task.id
            )));
        }
        let task = factory.create_task(&raw_task.task_type, &raw_task.settings)?;
        let mut wrapper = TaskWrapper::new(raw_task.id.clone(), task);
        for raw_reward in &raw_task.rewards {
            wrapper = wrapper.with_reward(resolve_reward(raw_reward, factory)?);
        }
        stage = stage.with_task(wrapper);
    }

    for raw_reward in &raw.rewards {
        stage = stage.with_reward(resolve_reward(raw_reward, factory)?);
    }

    Ok(stage)
}

fn resolve_reward(raw: &RawReward, factory: &ExtensionFactory) -> Result<RewardWrapper, QuestError> {
    let reward = factory.create_reward(&raw.reward_type, &raw.settings)?;
    Ok(RewardWrapper::new(reward, raw.setting.clone()))
}

impl PartialEq for Quest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.area == other.area
            && self.stages == other.stages
            && self.rewards == other.rewards
            && self.area_locked == other.area_locked
            && self.replayable == other.replayable
            && self.hidden == other.hidden
            && self.branching == other.branching
            && self.sequential == other.sequential
            && self.broken == other.broken
    }
}

impl Eq for Quest {}

impl Hash for Quest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.area.hash(state);
        self.stages.hash(state);
        self.rewards.hash(state);
        self.area_locked.hash(state);
        self.replayable.hash(state);
        self.hidden.hash(state);
        self.branching.hash(state);
        self.sequential.hash(state);
        self.broken.hash(state);
    }
}
