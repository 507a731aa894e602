//! Image Builders
//!
//! Snapshots of quest, area and player state written to storage. Builders
//! only read from the handlers. Saving with no target exports everything.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{decode, DataPair, DataType, Storage};
use crate::area::{Area, Region};
use crate::extension::Owner;
use crate::player::{PlayerHandler, QPlayer};
use crate::quest::{Quest, QuestId, QuestRegistry, RewardWrapper, Stage, StageId};

const QUEST_KEY: &str = "quest";
const AREA_KEY: &str = "area";
const PLAYER_KEY: &str = "player";

/// Exports one kind of state to storage
pub trait ImageBuilder<T: Sync> {
    type Image;

    /// Store an image of `target`, or of every known `T` when `None`.
    /// Returns how many images were written.
    fn save(&self, target: Option<&T>) -> impl Future<Output = Result<usize, String>> + Send;

    fn load(&self, id: Uuid) -> impl Future<Output = Option<Self::Image>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardImage {
    pub kind: String,
    pub owner: Owner,
    pub name: String,
    pub setting: Value,
}

impl RewardImage {
    fn capture(reward: &RewardWrapper) -> Self {
        let base = reward.reward().base();
        Self {
            kind: base.identifier().to_string(),
            owner: base.owner().clone(),
            name: base.display_name().to_string(),
            setting: reward.setting().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskImage {
    pub id: String,
    pub kind: String,
    pub owner: Owner,
    pub description: String,
    pub required: u32,
    pub rewards: Vec<RewardImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageImage {
    pub id: StageId,
    pub name: String,
    pub description: String,
    /// Attached at runtime rather than authored
    pub linked: bool,
    pub broken: bool,
    pub branching: bool,
    pub tasks: Vec<TaskImage>,
    pub rewards: Vec<RewardImage>,
}

/// Read-only snapshot of a quest and its stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestImage {
    pub id: QuestId,
    pub name: String,
    pub description: String,
    pub area: Option<Area>,
    pub area_locked: bool,
    pub replayable: bool,
    pub hidden: bool,
    pub sequential: bool,
    pub branching: bool,
    pub broken: bool,
    pub available: bool,
    pub first_stages: Vec<StageId>,
    pub stages: Vec<StageImage>,
    pub rewards: Vec<RewardImage>,
}

impl QuestImage {
    /// `stages` are the quest's authored and linked stages
    pub fn capture(quest: &Quest, stages: &[Stage]) -> Self {
        Self {
            id: quest.id(),
            name: quest.name().to_string(),
            description: quest.description().to_string(),
            area: quest.area().cloned(),
            area_locked: quest.is_area_locked(),
            replayable: quest.is_replayable(),
            hidden: quest.is_hidden(),
            sequential: quest.is_sequential(),
            branching: quest.has_branches(),
            broken: quest.is_broken(),
            available: quest.is_available(),
            first_stages: quest.first_stages(),
            stages: stages
                .iter()
                .map(|stage| StageImage {
                    id: stage.id,
                    name: stage.name.clone(),
                    description: stage.description.clone(),
                    linked: !quest.stages().contains(&stage.id),
                    broken: stage.check_broken(),
                    branching: stage.has_branching_tasks() || stage.is_branching(),
                    tasks: stage
                        .tasks
                        .iter()
                        .map(|task| TaskImage {
                            id: task.id.clone(),
                            kind: task.task.base().identifier().to_string(),
                            owner: task.task.base().owner().clone(),
                            description: task.task.describe(),
                            required: task.task.required(),
                            rewards: task.rewards.iter().map(RewardImage::capture).collect(),
                        })
                        .collect(),
                    rewards: stage.rewards.iter().map(RewardImage::capture).collect(),
                })
                .collect(),
            rewards: quest.rewards().iter().map(RewardImage::capture).collect(),
        }
    }
}

pub struct QuestImageBuilder<S> {
    storage: Arc<S>,
    registry: Arc<QuestRegistry>,
}

impl<S: Storage> QuestImageBuilder<S> {
    pub fn new(storage: Arc<S>, registry: Arc<QuestRegistry>) -> Self {
        Self { storage, registry }
    }

    async fn save_one(&self, quest_id: QuestId) -> Result<bool, String> {
        let Some((quest, stages)) = self.registry.quest_with_stages(quest_id).await else {
            warn!("Quest {} is not loaded; no image written", quest_id);
            return Ok(false);
        };
        let image = QuestImage::capture(&quest, &stages);
        let pair = DataPair::encode(QUEST_KEY, &image)?;
        self.storage
            .save(&quest_id.to_string(), DataType::Quest, &[pair])
            .await?;
        Ok(true)
    }
}

impl<S: Storage> ImageBuilder<Quest> for QuestImageBuilder<S> {
    type Image = QuestImage;

    async fn save(&self, target: Option<&Quest>) -> Result<usize, String> {
        let ids = match target {
            Some(quest) => vec![quest.id()],
            None => self.registry.all_ids().await,
        };

        let mut written = 0;
        for id in ids {
            if self.save_one(id).await? {
                written += 1;
            }
        }
        debug!("Wrote {} quest images", written);
        Ok(written)
    }

    async fn load(&self, id: Uuid) -> Option<QuestImage> {
        let data = self
            .storage
            .load(&id.to_string(), DataType::Quest, QUEST_KEY)
            .await?;
        decode(QUEST_KEY, data)
    }
}

pub struct AreaImageBuilder<S> {
    storage: Arc<S>,
    registry: Arc<QuestRegistry>,
}

impl<S: Storage> AreaImageBuilder<S> {
    pub fn new(storage: Arc<S>, registry: Arc<QuestRegistry>) -> Self {
        Self { storage, registry }
    }

    async fn save_one(&self, area: &Area) -> Result<(), String> {
        let pair = DataPair::encode(AREA_KEY, area)?;
        self.storage
            .save(&area.id().to_string(), DataType::Area, &[pair])
            .await
    }
}

impl<S: Storage> ImageBuilder<Area> for AreaImageBuilder<S> {
    type Image = Area;

    async fn save(&self, target: Option<&Area>) -> Result<usize, String> {
        match target {
            Some(area) => {
                self.save_one(area).await?;
                Ok(1)
            }
            None => {
                let areas = self.registry.areas().await;
                for area in &areas {
                    self.save_one(area).await?;
                }
                debug!("Wrote {} area images", areas.len());
                Ok(areas.len())
            }
        }
    }

    async fn load(&self, id: Uuid) -> Option<Area> {
        let data = self
            .storage
            .load(&id.to_string(), DataType::Area, AREA_KEY)
            .await?;
        decode(AREA_KEY, data)
    }
}

pub struct PlayerImageBuilder<S> {
    storage: Arc<S>,
    players: Arc<PlayerHandler>,
}

impl<S: Storage> PlayerImageBuilder<S> {
    pub fn new(storage: Arc<S>, players: Arc<PlayerHandler>) -> Self {
        Self { storage, players }
    }

    async fn save_one(&self, player: &QPlayer) -> Result<(), String> {
        let pair = DataPair::encode(PLAYER_KEY, player)?;
        self.storage
            .save(&player.id.to_string(), DataType::Player, &[pair])
            .await
    }

    /// Load every stored player into the player handler
    pub async fn restore_all(&self) -> usize {
        let mut restored = 0;
        for owner in self.storage.owners(DataType::Player).await {
            let Ok(id) = Uuid::parse_str(&owner) else {
                warn!("Ignoring player image with invalid id '{}'", owner);
                continue;
            };
            if let Some(player) = self.load(id).await {
                self.players.restore(player);
                restored += 1;
            }
        }
        info!("Restored {} players from storage", restored);
        restored
    }
}

impl<S: Storage> ImageBuilder<QPlayer> for PlayerImageBuilder<S> {
    type Image = QPlayer;

    async fn save(&self, target: Option<&QPlayer>) -> Result<usize, String> {
        match target {
            Some(player) => {
                self.save_one(player).await?;
                Ok(1)
            }
            None => {
                let players = self.players.snapshot_all().await;
                for player in &players {
                    self.save_one(player).await?;
                }
                debug!("Wrote {} player images", players.len());
                Ok(players.len())
            }
        }
    }

    async fn load(&self, id: Uuid) -> Option<QPlayer> {
        let data = self
            .storage
            .load(&id.to_string(), DataType::Player, PLAYER_KEY)
            .await?;
        decode(PLAYER_KEY, data)
    }
}
