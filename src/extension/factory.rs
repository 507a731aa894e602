//! Extension Factory
//!
//! Builds tasks and rewards by kind identifier and registers them before
//! handing them to the quest graph. Nothing else constructs extensions.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use super::{Extension, ExtensionId, Owner, Settings};
use crate::error::QuestError;
use crate::player::PlayerHandler;
use crate::quest::reward::{self, Reward};
use crate::quest::{QuestRegistry, Task, TaskHandler};

pub type RewardConstructor = fn() -> Box<dyn Reward>;

struct RewardKind {
    owner: Owner,
    constructor: RewardConstructor,
}

pub struct ExtensionFactory {
    tasks: Arc<TaskHandler>,
    rewards: HashMap<String, RewardKind>,
    quest_handler: Weak<QuestRegistry>,
    player_handler: Weak<PlayerHandler>,
}

impl ExtensionFactory {
    /// Create a factory that knows the built-in reward kinds
    pub fn new(
        tasks: Arc<TaskHandler>,
        quest_handler: Weak<QuestRegistry>,
        player_handler: Weak<PlayerHandler>,
    ) -> Self {
        let mut factory = Self {
            tasks,
            rewards: HashMap::new(),
            quest_handler,
            player_handler,
        };

        factory.register_reward_kind("experience", Owner::Builtin, reward::experience);
        factory.register_reward_kind("gold", Owner::Builtin, reward::gold);
        factory.register_reward_kind("item", Owner::Builtin, reward::item);
        factory.register_reward_kind("stage_link", Owner::Builtin, reward::stage_link);

        factory
    }

    /// Add a reward kind. A later registration under the same identifier wins.
    pub fn register_reward_kind(
        &mut self,
        identifier: &str,
        owner: Owner,
        constructor: RewardConstructor,
    ) {
        if self.rewards.contains_key(identifier) {
            warn!("Reward kind '{}' registered twice, overwriting", identifier);
        }
        self.rewards
            .insert(identifier.to_string(), RewardKind { owner, constructor });
    }

    pub fn task_handler(&self) -> &Arc<TaskHandler> {
        &self.tasks
    }

    pub fn reward_kinds(&self) -> impl Iterator<Item = &String> {
        self.rewards.keys()
    }

    /// Build and register a task of the given kind
    pub fn create_task(
        &self,
        identifier: &str,
        settings: &Settings,
    ) -> Result<Arc<dyn Task>, QuestError> {
        let (owner, mut task) = self
            .tasks
            .create(identifier)
            .ok_or_else(|| QuestError::UnknownExtension(identifier.to_string()))?;

        self.register(task.as_mut(), identifier, owner, settings);
        Ok(Arc::from(task))
    }

    /// Build and register a reward of the given kind
    pub fn create_reward(
        &self,
        identifier: &str,
        settings: &Settings,
    ) -> Result<Arc<dyn Reward>, QuestError> {
        let kind = self
            .rewards
            .get(identifier)
            .ok_or_else(|| QuestError::UnknownExtension(identifier.to_string()))?;

        let mut reward = (kind.constructor)();
        self.register(reward.as_mut(), identifier, kind.owner.clone(), settings);
        Ok(Arc::from(reward))
    }

    fn register<E: Extension + ?Sized>(
        &self,
        extension: &mut E,
        identifier: &str,
        owner: Owner,
        settings: &Settings,
    ) {
        let id = ExtensionId::new();
        extension.base_mut().register(
            id,
            identifier,
            owner,
            Arc::downgrade(&self.tasks),
            self.quest_handler.clone(),
            self.player_handler.clone(),
            settings,
        );
        extension.init();
        debug!("Registered extension {} ({})", identifier, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn factory() -> ExtensionFactory {
        ExtensionFactory::new(
            Arc::new(TaskHandler::with_builtin()),
            Weak::new(),
            Weak::new(),
        )
    }

    #[test]
    fn test_create_registered_task() {
        let mut settings = Settings::new();
        settings.insert("target".to_string(), Value::from("slime"));
        settings.insert("count".to_string(), Value::from(5));

        let factory = factory();
        let task = factory.create_task("kill_monster", &settings).unwrap();
        assert!(task.base().is_registered());
        assert_eq!(task.base().identifier(), "kill_monster");
        assert_eq!(task.base().owner(), &Owner::Builtin);
        assert_eq!(task.required(), 5);
        assert!(task.base().task_handler().is_some());

        drop(factory);
        assert!(task.base().task_handler().is_none());
    }

    #[test]
    fn test_create_registered_reward() {
        let reward = factory().create_reward("stage_link", &Settings::new()).unwrap();
        assert_eq!(reward.base().identifier(), "stage_link");
        assert!(reward.base().quest_handler().is_none());
    }

    #[test]
    fn test_unknown_kinds() {
        let factory = factory();
        assert_eq!(
            factory.create_task("escort", &Settings::new()).unwrap_err(),
            QuestError::UnknownExtension("escort".to_string())
        );
        assert!(factory.create_reward("teleport", &Settings::new()).is_err());
    }

    #[test]
    fn test_instances_get_distinct_ids() {
        let factory = factory();
        let first = factory.create_reward("gold", &Settings::new()).unwrap();
        let second = factory.create_reward("gold", &Settings::new()).unwrap();
        assert_ne!(first.base().id(), second.base().id());
        assert_ne!(first.base(), second.base());
    }
}
