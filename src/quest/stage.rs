//! Quest Stages
//!
//! A stage is a node of the stage graph holding the tasks a player works on.
//! Stages are shared by every player; progress lives in the player's run.

use std::sync::Arc;

use super::reward::RewardWrapper;
use super::task::Task;
use super::StageId;

/// A task inside a stage together with its completion rewards
#[derive(Debug, Clone)]
pub struct TaskWrapper {
    /// Author-chosen id, unique within the stage
    pub id: String,
    pub task: Arc<dyn Task>,
    pub rewards: Vec<RewardWrapper>,
}

impl TaskWrapper {
    pub fn new(id: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            id: id.into(),
            task,
            rewards: Vec::new(),
        }
    }

    pub fn with_reward(mut self, reward: RewardWrapper) -> Self {
        self.rewards.push(reward);
        self
    }

    /// A task is branching when completing it links another stage
    pub fn is_branching(&self) -> bool {
        self.rewards.iter().any(|reward| reward.link_target().is_some())
    }

    pub fn link_targets(&self) -> impl Iterator<Item = StageId> + '_ {
        self.rewards.iter().filter_map(RewardWrapper::link_target)
    }

    pub fn check_broken(&self) -> bool {
        self.task.check_broken() || self.rewards.iter().any(|reward| !reward.accepts())
    }
}

impl PartialEq for TaskWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.task.base() == other.task.base()
            && self.rewards == other.rewards
    }
}

impl Eq for TaskWrapper {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub description: String,
    pub tasks: Vec<TaskWrapper>,
    /// Given when every task of the stage is done
    pub rewards: Vec<RewardWrapper>,
}

impl Stage {
    pub fn new(id: StageId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            tasks: Vec::new(),
            rewards: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_task(mut self, task: TaskWrapper) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_reward(mut self, reward: RewardWrapper) -> Self {
        self.rewards.push(reward);
        self
    }

    pub fn task(&self, id: &str) -> Option<&TaskWrapper> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// True when the stage cannot be played: no tasks, a broken task, or a
    /// reward whose setting it does not accept
    pub fn check_broken(&self) -> bool {
        self.tasks.is_empty()
            || self.tasks.iter().any(TaskWrapper::check_broken)
            || self.rewards.iter().any(|reward| !reward.accepts())
    }

    /// The stage is a branch point: some of its tasks each lead elsewhere
    pub fn has_branching_tasks(&self) -> bool {
        self.tasks.iter().any(TaskWrapper::is_branching)
    }

    /// Completing the stage links another stage
    pub fn is_branching(&self) -> bool {
        self.rewards.iter().any(|reward| reward.link_target().is_some())
    }

    /// Stages a player may branch into from here: task links first, then
    /// stage-reward links, without duplicates
    pub fn branch_candidates(&self) -> Vec<StageId> {
        let mut candidates = Vec::new();
        let task_links = self.tasks.iter().flat_map(TaskWrapper::link_targets);
        let stage_links = self.rewards.iter().filter_map(RewardWrapper::link_target);
        for stage in task_links.chain(stage_links) {
            if !candidates.contains(&stage) {
                candidates.push(stage);
            }
        }
        candidates
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builders shared by the quest module tests

    use super::*;
    use crate::extension::{ExtensionFactory, Settings};
    use crate::quest::TaskHandler;
    use serde_json::Value;
    use std::sync::Weak;

    pub fn factory() -> ExtensionFactory {
        ExtensionFactory::new(Arc::new(TaskHandler::with_builtin()), Weak::new(), Weak::new())
    }

    pub fn kill_task(id: &str, target: &str, count: u32) -> TaskWrapper {
        let mut settings = Settings::new();
        settings.insert("target".to_string(), Value::from(target));
        settings.insert("count".to_string(), Value::from(count));
        let task = factory()
            .create_task("kill_monster", &settings)
            .expect("kill_monster is built in");
        TaskWrapper::new(id, task)
    }

    pub fn talk_task(id: &str, npc: &str) -> TaskWrapper {
        let mut settings = Settings::new();
        settings.insert("target".to_string(), Value::from(npc));
        let task = factory()
            .create_task("talk_to", &settings)
            .expect("talk_to is built in");
        TaskWrapper::new(id, task)
    }

    pub fn reward(kind: &str, setting: Value) -> RewardWrapper {
        let reward = factory()
            .create_reward(kind, &Settings::new())
            .expect("reward kind is built in");
        RewardWrapper::new(reward, setting)
    }

    pub fn link(target: StageId) -> RewardWrapper {
        reward("stage_link", Value::from(target.to_string()))
    }

    /// Stage with a single talk task
    pub fn simple_stage(name: &str) -> Stage {
        Stage::new(StageId::new(), name).with_task(talk_task("talk", name))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_empty_stage_is_broken() {
        let stage = Stage::new(StageId::new(), "Nothing to do");
        assert!(stage.check_broken());
        assert!(!simple_stage("elder").check_broken());
    }

    #[test]
    fn test_bad_reward_setting_breaks_stage() {
        let stage = simple_stage("elder").with_reward(reward("gold", Value::from("lots")));
        assert!(stage.check_broken());

        let stage = Stage::new(StageId::new(), "Hunt")
            .with_task(kill_task("kill", "slime", 3).with_reward(reward("item", Value::from(5))));
        assert!(stage.check_broken());
    }

    #[test]
    fn test_branching_flags() {
        let left = StageId::new();
        let right = StageId::new();

        let choice = Stage::new(StageId::new(), "Choose a side")
            .with_task(talk_task("guard", "guard_captain").with_reward(link(left)))
            .with_task(talk_task("thief", "thief_master").with_reward(link(right)));
        assert!(choice.has_branching_tasks());
        assert!(!choice.is_branching());
        assert_eq!(choice.branch_candidates(), vec![left, right]);

        let gate = simple_stage("gate").with_reward(link(left)).with_reward(link(left));
        assert!(gate.is_branching());
        assert!(!gate.has_branching_tasks());
        assert_eq!(gate.branch_candidates(), vec![left]);
    }

    #[test]
    fn test_task_lookup() {
        let stage = Stage::new(StageId::new(), "Hunt")
            .with_task(kill_task("slimes", "slime", 5))
            .with_task(kill_task("wolves", "wolf", 2));
        assert_eq!(stage.task("wolves").map(|task| task.task.required()), Some(2));
        assert!(stage.task("bears").is_none());
    }
}
