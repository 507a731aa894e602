//! Quest Extensions
//!
//! Tasks and rewards are pluggable building blocks. Each one carries display
//! metadata from construction and receives its identity, owner, settings and
//! handler back-references exactly once, when the [`ExtensionFactory`]
//! registers it.

pub mod factory;

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::player::{HostPlayer, PlayerHandler, QPlayer};
use crate::quest::{QuestRegistry, TaskHandler};

pub use factory::ExtensionFactory;

/// Author-supplied extension settings
pub type Settings = HashMap<String, Value>;

/// Unique identifier of a registered extension instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(pub Uuid);

impl ExtensionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExtensionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who provided an extension kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Builtin,
    Plugin(String),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Builtin => write!(f, "builtin"),
            Owner::Plugin(name) => write!(f, "plugin:{}", name),
        }
    }
}

/// Identity and handler references bound at registration
#[derive(Debug, Clone)]
struct Registration {
    id: ExtensionId,
    identifier: String,
    owner: Owner,
    task_handler: Weak<TaskHandler>,
    quest_handler: Weak<QuestRegistry>,
    player_handler: Weak<PlayerHandler>,
}

impl PartialEq for Registration {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.identifier == other.identifier
            && self.owner == other.owner
            && Weak::ptr_eq(&self.task_handler, &other.task_handler)
            && Weak::ptr_eq(&self.quest_handler, &other.quest_handler)
            && Weak::ptr_eq(&self.player_handler, &other.player_handler)
    }
}

/// State shared by every extension
#[derive(Debug, Clone)]
pub struct ExtensionBase {
    display_name: String,
    description: String,
    settings: Settings,
    registration: Option<Registration>,
}

impl ExtensionBase {
    pub fn new(display_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            description: description.into(),
            settings: Settings::new(),
            registration: None,
        }
    }

    /// Bind identity, owner and handlers. Settings are copied.
    ///
    /// # Panics
    ///
    /// Panics when called a second time.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn register(
        &mut self,
        id: ExtensionId,
        identifier: &str,
        owner: Owner,
        task_handler: Weak<TaskHandler>,
        quest_handler: Weak<QuestRegistry>,
        player_handler: Weak<PlayerHandler>,
        settings: &Settings,
    ) {
        assert!(
            self.registration.is_none(),
            "extension '{}' registered twice",
            self.display_name
        );

        self.registration = Some(Registration {
            id,
            identifier: identifier.to_string(),
            owner,
            task_handler,
            quest_handler,
            player_handler,
        });
        self.settings = settings.clone();
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    fn registration(&self) -> &Registration {
        match &self.registration {
            Some(registration) => registration,
            None => panic!("extension '{}' used before registration", self.display_name),
        }
    }

    /// # Panics
    ///
    /// Panics if the extension has not been registered.
    pub fn id(&self) -> ExtensionId {
        self.registration().id
    }

    /// # Panics
    ///
    /// Panics if the extension has not been registered.
    pub fn identifier(&self) -> &str {
        &self.registration().identifier
    }

    /// # Panics
    ///
    /// Panics if the extension has not been registered.
    pub fn owner(&self) -> &Owner {
        &self.registration().owner
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    pub fn setting_u32(&self, key: &str) -> Option<u32> {
        self.settings
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Handlers are owned elsewhere; these return `None` once they are gone.
    ///
    /// # Panics
    ///
    /// Panics if the extension has not been registered.
    pub fn task_handler(&self) -> Option<Arc<TaskHandler>> {
        self.registration().task_handler.upgrade()
    }

    /// # Panics
    ///
    /// Panics if the extension has not been registered.
    pub fn quest_handler(&self) -> Option<Arc<QuestRegistry>> {
        self.registration().quest_handler.upgrade()
    }

    /// # Panics
    ///
    /// Panics if the extension has not been registered.
    pub fn player_handler(&self) -> Option<Arc<PlayerHandler>> {
        self.registration().player_handler.upgrade()
    }

    /// Resolve the quest record of a host player through the player handler
    pub fn get_player(&self, player: &HostPlayer) -> Option<Arc<Mutex<QPlayer>>> {
        self.player_handler().map(|handler| handler.get_player(player))
    }
}

impl PartialEq for ExtensionBase {
    fn eq(&self, other: &Self) -> bool {
        self.display_name == other.display_name
            && self.description == other.description
            && self.settings == other.settings
            && self.registration == other.registration
    }
}

impl Eq for ExtensionBase {}

impl Hash for ExtensionBase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.display_name.hash(state);
        self.description.hash(state);
        if let Some(registration) = &self.registration {
            registration.id.hash(state);
            registration.identifier.hash(state);
            registration.owner.hash(state);
            (registration.task_handler.as_ptr() as usize).hash(state);
            (registration.quest_handler.as_ptr() as usize).hash(state);
            (registration.player_handler.as_ptr() as usize).hash(state);
        }
    }
}

/// Common interface of tasks and rewards
pub trait Extension: fmt::Debug + Send + Sync {
    fn base(&self) -> &ExtensionBase;

    fn base_mut(&mut self) -> &mut ExtensionBase;

    /// Runs once, right after registration
    fn init(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(base: &mut ExtensionBase, id: ExtensionId, owner: Owner, settings: &Settings) {
        base.register(
            id,
            "kill_monster",
            owner,
            Weak::new(),
            Weak::new(),
            Weak::new(),
            settings,
        );
    }

    #[test]
    fn test_settings_are_copied() {
        let mut settings = Settings::new();
        settings.insert("target".to_string(), Value::from("slime"));

        let mut base = ExtensionBase::new("Kill monsters", "Kill a number of monsters");
        registered(&mut base, ExtensionId::new(), Owner::Builtin, &settings);

        settings.insert("target".to_string(), Value::from("wolf"));
        settings.insert("count".to_string(), Value::from(3));

        assert_eq!(base.setting_str("target"), Some("slime"));
        assert_eq!(base.setting_u32("count"), None);
    }

    #[test]
    fn test_equality_covers_owner() {
        let id = ExtensionId::new();
        let settings = Settings::new();

        let mut builtin = ExtensionBase::new("Kill monsters", "");
        registered(&mut builtin, id, Owner::Builtin, &settings);

        let mut plugin = ExtensionBase::new("Kill monsters", "");
        registered(&mut plugin, id, Owner::Plugin("bestiary".to_string()), &settings);

        assert_ne!(builtin, plugin);
        assert_eq!(builtin, builtin.clone());
    }

    #[test]
    fn test_equality_covers_handler_identity() {
        let id = ExtensionId::new();
        let settings = Settings::new();
        let players = Arc::new(PlayerHandler::new());

        let mut detached = ExtensionBase::new("Kill monsters", "");
        registered(&mut detached, id, Owner::Builtin, &settings);

        let mut attached = ExtensionBase::new("Kill monsters", "");
        attached.register(
            id,
            "kill_monster",
            Owner::Builtin,
            Weak::new(),
            Weak::new(),
            Arc::downgrade(&players),
            &settings,
        );

        assert_ne!(detached, attached);
        assert!(attached.player_handler().is_some());
        assert!(detached.player_handler().is_none());
    }

    #[test]
    #[should_panic(expected = "used before registration")]
    fn test_unregistered_identity_panics() {
        let base = ExtensionBase::new("Kill monsters", "");
        let _ = base.id();
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_double_registration_panics() {
        let mut base = ExtensionBase::new("Kill monsters", "");
        registered(&mut base, ExtensionId::new(), Owner::Builtin, &Settings::new());
        registered(&mut base, ExtensionId::new(), Owner::Builtin, &Settings::new());
    }

    #[tokio::test]
    async fn test_get_player_delegates_to_handler() {
        let players = Arc::new(PlayerHandler::new());
        let mut base = ExtensionBase::new("Reward", "");
        base.register(
            ExtensionId::new(),
            "experience",
            Owner::Builtin,
            Weak::new(),
            Weak::new(),
            Arc::downgrade(&players),
            &Settings::new(),
        );

        let host = HostPlayer::new(crate::player::PlayerId::new(), "Alice");
        let record = base.get_player(&host).unwrap();
        assert_eq!(record.lock().await.name, "Alice");
        assert_eq!(players.len(), 1);
    }
}
