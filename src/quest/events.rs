//! Quest Event Types
//!
//! Player actions reported by the host server that can advance tasks.

use serde::{Deserialize, Serialize};

use super::{QuestId, StageId};
use crate::area::Location;
use crate::player::HostPlayer;

/// What the player did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestAction {
    /// Player killed a monster
    MonsterKilled {
        /// Entity prototype ID (e.g., "slime")
        entity_type: String,
        #[serde(default)]
        level: i32,
    },

    /// Player collected an item
    ItemCollected {
        item_id: String,
        #[serde(default = "default_count")]
        count: u32,
    },

    /// Player talked to an NPC
    NpcInteraction { npc_id: String },

    /// Player reached a named location
    LocationReached { location_id: String },
}

fn default_count() -> u32 {
    1
}

impl QuestAction {
    /// Event type as string (for logging/debugging)
    pub fn event_type(&self) -> &'static str {
        match self {
            QuestAction::MonsterKilled { .. } => "monster_killed",
            QuestAction::ItemCollected { .. } => "item_collected",
            QuestAction::NpcInteraction { .. } => "npc_interaction",
            QuestAction::LocationReached { .. } => "location_reached",
        }
    }
}

/// A player action together with where it happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestEvent {
    pub player: HostPlayer,
    /// Player position when the action happened; gates area-locked quests
    pub location: Location,
    pub action: QuestAction,
}

impl QuestEvent {
    pub fn new(player: HostPlayer, location: Location, action: QuestAction) -> Self {
        Self {
            player,
            location,
            action,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.action.event_type()
    }
}

/// Change to a single task caused by an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub quest_id: QuestId,
    pub stage_id: StageId,
    pub task_id: String,
    pub current: u32,
    pub target: u32,
    /// The task was completed by this event
    pub task_completed: bool,
    /// The stage holding the task was completed by this event
    pub stage_completed: bool,
    /// The whole quest was completed by this event
    pub quest_completed: bool,
}

impl ProgressUpdate {
    pub fn task_updated(
        quest_id: QuestId,
        stage_id: StageId,
        task_id: &str,
        current: u32,
        target: u32,
        task_completed: bool,
    ) -> Self {
        Self {
            quest_id,
            stage_id,
            task_id: task_id.to_string(),
            current,
            target,
            task_completed,
            stage_completed: false,
            quest_completed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json() {
        let json = r#"{
            "player": { "id": "2c7b3f3e-5d1a-4a39-9a0e-6f1d2b3c4d5e", "name": "Alice" },
            "location": { "world": "world1", "x": 1.0, "y": 2.0, "z": 3.0 },
            "action": { "type": "item_collected", "item_id": "slime_core" }
        }"#;
        let event: QuestEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "item_collected");
        assert_eq!(
            event.action,
            QuestAction::ItemCollected { item_id: "slime_core".to_string(), count: 1 }
        );
        assert_eq!(event.player.name, "Alice");
    }
}
