//! Quest Tasks
//!
//! Tasks are the units of work inside a stage. The task handler is the
//! catalog of task kinds the extension factory can build.

use std::collections::HashMap;

use tracing::warn;

use super::events::{QuestAction, QuestEvent};
use crate::extension::{Extension, ExtensionBase, Owner};

/// A unit of work a player completes inside a stage
pub trait Task: Extension {
    /// Progress needed to complete the task
    fn required(&self) -> u32 {
        self.base().setting_u32("count").unwrap_or(1)
    }

    /// Progress this event contributes; zero when unrelated
    fn progress(&self, event: &QuestEvent) -> u32;

    /// True when required settings are missing or invalid
    fn check_broken(&self) -> bool {
        let target_missing = self
            .base()
            .setting_str("target")
            .is_none_or(|target| target.trim().is_empty());
        target_missing || self.required() == 0
    }

    /// Text shown in progress views
    fn describe(&self) -> String {
        if let Some(description) = self.base().setting_str("description") {
            return description.to_string();
        }
        match self.base().setting_str("target") {
            Some(target) => format!("{}: {}", self.base().display_name(), target),
            None => self.base().display_name().to_string(),
        }
    }
}

fn targets(base: &ExtensionBase, value: &str) -> bool {
    base.setting_str("target") == Some(value)
}

pub type TaskConstructor = fn() -> Box<dyn Task>;

struct TaskKind {
    owner: Owner,
    constructor: TaskConstructor,
}

/// Catalog of task kinds
pub struct TaskHandler {
    kinds: HashMap<String, TaskKind>,
}

impl TaskHandler {
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Catalog holding the kill, collect, talk and location tasks
    pub fn with_builtin() -> Self {
        let mut handler = Self::new();
        handler.register_kind("kill_monster", Owner::Builtin, kill_monster);
        handler.register_kind("collect_item", Owner::Builtin, collect_item);
        handler.register_kind("talk_to", Owner::Builtin, talk_to);
        handler.register_kind("reach_location", Owner::Builtin, reach_location);
        handler
    }

    pub fn register_kind(&mut self, identifier: &str, owner: Owner, constructor: TaskConstructor) {
        if self.kinds.contains_key(identifier) {
            warn!("Task kind '{}' registered twice, overwriting", identifier);
        }
        self.kinds
            .insert(identifier.to_string(), TaskKind { owner, constructor });
    }

    /// Construct an unregistered task of this kind
    pub fn create(&self, identifier: &str) -> Option<(Owner, Box<dyn Task>)> {
        self.kinds
            .get(identifier)
            .map(|kind| (kind.owner.clone(), (kind.constructor)()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.kinds.contains_key(identifier)
    }

    /// Identifier, display name and description of every kind
    pub fn describe(&self) -> Vec<(String, String, String)> {
        let mut kinds: Vec<_> = self
            .kinds
            .iter()
            .map(|(identifier, kind)| {
                let task = (kind.constructor)();
                (
                    identifier.clone(),
                    task.base().display_name().to_string(),
                    task.base().description().to_string(),
                )
            })
            .collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for TaskHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Built-in tasks
// ============================================================================

pub fn kill_monster() -> Box<dyn Task> {
    Box::new(KillMonsterTask::new())
}

pub fn collect_item() -> Box<dyn Task> {
    Box::new(CollectItemTask::new())
}

pub fn talk_to() -> Box<dyn Task> {
    Box::new(TalkToTask::new())
}

pub fn reach_location() -> Box<dyn Task> {
    Box::new(ReachLocationTask::new())
}

/// Kill `count` monsters of type `target`
#[derive(Debug)]
pub struct KillMonsterTask {
    base: ExtensionBase,
}

impl KillMonsterTask {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new("Kill monsters", "Kill a number of monsters of one type"),
        }
    }
}

impl Default for KillMonsterTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for KillMonsterTask {
    fn base(&self) -> &ExtensionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ExtensionBase {
        &mut self.base
    }
}

impl Task for KillMonsterTask {
    fn progress(&self, event: &QuestEvent) -> u32 {
        match &event.action {
            QuestAction::MonsterKilled { entity_type, .. } if targets(&self.base, entity_type) => 1,
            _ => 0,
        }
    }
}

/// Collect `count` items with id `target`
#[derive(Debug)]
pub struct CollectItemTask {
    base: ExtensionBase,
}

impl CollectItemTask {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new("Collect items", "Gather a number of items"),
        }
    }
}

impl Default for CollectItemTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for CollectItemTask {
    fn base(&self) -> &ExtensionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ExtensionBase {
        &mut self.base
    }
}

impl Task for CollectItemTask {
    fn progress(&self, event: &QuestEvent) -> u32 {
        match &event.action {
            QuestAction::ItemCollected { item_id, count } if targets(&self.base, item_id) => *count,
            _ => 0,
        }
    }
}

/// Talk to the NPC `target`
#[derive(Debug)]
pub struct TalkToTask {
    base: ExtensionBase,
}

impl TalkToTask {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new("Talk to", "Speak with a specific NPC"),
        }
    }
}

impl Default for TalkToTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for TalkToTask {
    fn base(&self) -> &ExtensionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ExtensionBase {
        &mut self.base
    }
}

impl Task for TalkToTask {
    fn required(&self) -> u32 {
        1
    }

    fn progress(&self, event: &QuestEvent) -> u32 {
        match &event.action {
            QuestAction::NpcInteraction { npc_id } if targets(&self.base, npc_id) => 1,
            _ => 0,
        }
    }
}

/// Reach the location `target`
#[derive(Debug)]
pub struct ReachLocationTask {
    base: ExtensionBase,
}

impl ReachLocationTask {
    pub fn new() -> Self {
        Self {
            base: ExtensionBase::new("Reach location", "Travel to a named location"),
        }
    }
}

impl Default for ReachLocationTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for ReachLocationTask {
    fn base(&self) -> &ExtensionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ExtensionBase {
        &mut self.base
    }
}

impl Task for ReachLocationTask {
    fn required(&self) -> u32 {
        1
    }

    fn progress(&self, event: &QuestEvent) -> u32 {
        match &event.action {
            QuestAction::LocationReached { location_id } if targets(&self.base, location_id) => 1,
            _ => 0,
        }
    }
}
