//! Players
//!
//! The host server supplies [`HostPlayer`] values; the player handler maps
//! them to the quest-side [`QPlayer`] record that owns per-player progress.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::quest::{QuestId, QuestRun};

/// Unique identifier of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Player reference supplied by the host server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPlayer {
    pub id: PlayerId,
    pub name: String,
}

impl HostPlayer {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Quest-side record of a player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QPlayer {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub gold: i64,
    /// Item id -> quantity granted by rewards
    #[serde(default)]
    pub items: HashMap<String, u32>,
    /// Quest runs in progress
    #[serde(default)]
    pub runs: HashMap<QuestId, QuestRun>,
    /// Completed quest IDs
    #[serde(default)]
    pub completed: Vec<QuestId>,
    /// Completed and abandoned runs, oldest first
    #[serde(default)]
    pub history: Vec<QuestRun>,
}

impl QPlayer {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            exp: 0,
            gold: 0,
            items: HashMap::new(),
            runs: HashMap::new(),
            completed: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn run(&self, quest_id: QuestId) -> Option<&QuestRun> {
        self.runs.get(&quest_id)
    }

    pub fn run_mut(&mut self, quest_id: QuestId) -> Option<&mut QuestRun> {
        self.runs.get_mut(&quest_id)
    }

    pub fn is_quest_active(&self, quest_id: QuestId) -> bool {
        self.runs.contains_key(&quest_id)
    }

    pub fn is_quest_completed(&self, quest_id: QuestId) -> bool {
        self.completed.contains(&quest_id)
    }

    pub fn active_quest_ids(&self) -> Vec<QuestId> {
        let mut ids: Vec<QuestId> = self.runs.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Move a finished run out of the active set and into the history
    pub fn complete_quest(&mut self, quest_id: QuestId) -> Option<&QuestRun> {
        let mut run = self.runs.remove(&quest_id)?;
        run.complete();
        if !self.is_quest_completed(quest_id) {
            self.completed.push(quest_id);
        }
        self.history.push(run);
        self.history.last()
    }

    pub fn abandon_quest(&mut self, quest_id: QuestId) -> Option<&QuestRun> {
        let mut run = self.runs.remove(&quest_id)?;
        run.abandon();
        self.history.push(run);
        self.history.last()
    }

    /// Most recent finished or abandoned run of a quest
    pub fn last_run(&self, quest_id: QuestId) -> Option<&QuestRun> {
        self.history.iter().rev().find(|run| run.quest_id == quest_id)
    }

    pub fn grant_exp(&mut self, amount: i64) {
        self.exp = self.exp.saturating_add(amount);
    }

    pub fn grant_gold(&mut self, amount: i64) {
        self.gold = self.gold.saturating_add(amount);
    }

    pub fn grant_items(&mut self, item_id: &str, count: u32) {
        let held = self.items.entry(item_id.to_string()).or_insert(0);
        *held = held.saturating_add(count);
    }
}

/// Owns every player's quest record
pub struct PlayerHandler {
    players: DashMap<PlayerId, Arc<Mutex<QPlayer>>>,
}

impl PlayerHandler {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
        }
    }

    /// Record for a host player, created on first use
    pub fn get_player(&self, player: &HostPlayer) -> Arc<Mutex<QPlayer>> {
        self.players
            .entry(player.id)
            .or_insert_with(|| {
                debug!("Created quest record for player {} ({})", player.name, player.id);
                Arc::new(Mutex::new(QPlayer::new(player.id, player.name.clone())))
            })
            .clone()
    }

    pub fn get(&self, id: PlayerId) -> Option<Arc<Mutex<QPlayer>>> {
        self.players.get(&id).map(|entry| entry.value().clone())
    }

    /// Replace a record, e.g. from a stored player image
    pub fn restore(&self, player: QPlayer) {
        self.players.insert(player.id, Arc::new(Mutex::new(player)));
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }

    /// Copy of a single record
    pub async fn snapshot(&self, id: PlayerId) -> Option<QPlayer> {
        let player = self.get(id)?;
        let player = player.lock().await;
        Some(player.clone())
    }

    /// Copy of every record
    pub async fn snapshot_all(&self) -> Vec<QPlayer> {
        // Collect handles first so no map shard is held across an await
        let handles: Vec<_> = self.players.iter().map(|entry| entry.value().clone()).collect();
        let mut players = Vec::with_capacity(handles.len());
        for handle in handles {
            players.push(handle.lock().await.clone());
        }
        players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl Default for PlayerHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_player_creates_once() {
        let handler = PlayerHandler::new();
        let host = HostPlayer::new(PlayerId::new(), "Alice");

        let first = handler.get_player(&host);
        first.lock().await.gold = 10;

        let second = handler.get_player(&host);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.gold, 10);
        assert_eq!(handler.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_and_snapshot() {
        let handler = PlayerHandler::new();
        let mut player = QPlayer::new(PlayerId::new(), "Bob");
        player.exp = 250;
        player.grant_items("health_potion", 2);
        player.grant_items("health_potion", 1);
        let id = player.id;

        handler.restore(player);
        let snapshot = handler.snapshot(id).await.unwrap();
        assert_eq!(snapshot.exp, 250);
        assert_eq!(snapshot.items.get("health_potion"), Some(&3));
        assert_eq!(handler.snapshot_all().await.len(), 1);
        assert!(handler.snapshot(PlayerId::new()).await.is_none());
    }

    #[test]
    fn test_complete_and_abandon() {
        let mut player = QPlayer::new(PlayerId::new(), "Carol");
        let first = QuestId::new();
        let second = QuestId::new();
        player.runs.insert(first, QuestRun::new(first));
        player.runs.insert(second, QuestRun::new(second));

        let run = player.complete_quest(first).unwrap();
        assert!(run.is_terminal());
        assert!(player.is_quest_completed(first));
        assert!(!player.is_quest_active(first));

        player.abandon_quest(second);
        assert!(!player.is_quest_active(second));
        assert!(!player.is_quest_completed(second));
        assert!(player.complete_quest(second).is_none());

        assert_eq!(player.history.len(), 2);
        assert_eq!(player.last_run(first).unwrap().status, crate::quest::RunStatus::Completed);
        assert_eq!(player.last_run(second).unwrap().status, crate::quest::RunStatus::Abandoned);
    }

    #[test]
    fn test_grants_saturate() {
        let mut player = QPlayer::new(PlayerId::new(), "Dave");
        player.grant_exp(i64::MAX);
        player.grant_exp(i64::MAX);
        player.grant_gold(i64::MAX - 1);
        player.grant_gold(5);
        player.grant_items("arrow", u32::MAX);
        player.grant_items("arrow", 10);

        assert_eq!(player.exp, i64::MAX);
        assert_eq!(player.gold, i64::MAX);
        assert_eq!(player.items.get("arrow"), Some(&u32::MAX));
    }
}
