//! Quest Registry
//!
//! The quest handler. Loads quest definitions from TOML files into the
//! shared stage graph, starts and abandons runs, routes player events to
//! active runs and links floating stages when stage-link rewards fire.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::definition::{Quest, RawQuestFile};
use super::events::{ProgressUpdate, QuestEvent};
use super::graph::{Attachment, StageGraph};
use super::progress;
use super::reward::RewardContext;
use super::stage::Stage;
use super::state::{BranchState, RunView};
use super::{QuestId, StageId, TaskHandler};
use crate::area::Area;
use crate::error::QuestError;
use crate::extension::ExtensionFactory;
use crate::player::{HostPlayer, PlayerHandler, PlayerId, QPlayer};

/// Registry for all quest definitions
pub struct QuestRegistry {
    /// Loaded quest definitions
    quests: RwLock<HashMap<QuestId, Arc<Quest>>>,
    /// Every stage node, authored and floating
    graph: RwLock<StageGraph>,
    /// One lock per quest definition, taken while linking stages into it
    link_locks: DashMap<QuestId, Arc<Mutex<()>>>,
    factory: ExtensionFactory,
    players: Arc<PlayerHandler>,
    /// Directory holding quest TOML files
    data_dir: PathBuf,
    /// Area checks for locked quests ignore the height axis
    ignore_height: bool,
}

impl QuestRegistry {
    /// Quests load from `data_dir/quests`
    pub fn new(
        data_dir: &Path,
        ignore_height: bool,
        tasks: Arc<TaskHandler>,
        players: Arc<PlayerHandler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|registry| Self {
            quests: RwLock::new(HashMap::new()),
            graph: RwLock::new(StageGraph::new()),
            link_locks: DashMap::new(),
            factory: ExtensionFactory::new(tasks, registry.clone(), Arc::downgrade(&players)),
            players,
            data_dir: data_dir.join("quests"),
            ignore_height,
        })
    }

    /// Factory whose extensions point back at this registry
    pub fn factory(&self) -> &ExtensionFactory {
        &self.factory
    }

    pub fn players(&self) -> &Arc<PlayerHandler> {
        &self.players
    }

    /// Load all quest definitions from the data directory, replacing the
    /// current set. Returns the number of quests loaded.
    pub async fn load_all(&self) -> Result<usize, String> {
        info!("Loading quests from {:?}", self.data_dir);

        if !self.data_dir.exists() {
            warn!("Quest directory does not exist: {:?}", self.data_dir);
            return Ok(0);
        }

        let mut paths = Vec::new();
        collect_quest_files(&self.data_dir, &mut paths)?;
        paths.sort();

        let mut graph = StageGraph::new();
        let mut quests = HashMap::new();
        for path in paths {
            match self.load_quest_file(&path, &mut graph, &quests) {
                Ok(quest) => {
                    info!("Loaded quest: {} ({})", quest.name(), quest.id());
                    quests.insert(quest.id(), quest);
                }
                Err(e) => warn!("Failed to load quest {:?}: {}", path, e),
            }
        }

        validate_links(&graph);
        for quest in quests.values_mut() {
            refresh_flags(quest, &graph);
        }

        let count = quests.len();
        let mut current = self.quests.write().await;
        let mut current_graph = self.graph.write().await;
        *current = quests
            .into_iter()
            .map(|(id, quest)| (id, Arc::new(quest)))
            .collect();
        *current_graph = graph;

        info!("Loaded {} quest definitions ({} stages)", count, current_graph.len());
        Ok(count)
    }

    /// Load a single quest file into `graph`
    fn load_quest_file(
        &self,
        path: &Path,
        graph: &mut StageGraph,
        loaded: &HashMap<QuestId, Quest>,
    ) -> Result<Quest, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

        let raw: RawQuestFile = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        let (quest, stages) = Quest::from_raw(raw.quest, &self.factory).map_err(|e| e.to_string())?;
        if loaded.contains_key(&quest.id()) {
            return Err(format!("Quest {} is defined more than once", quest.id()));
        }

        add_to_graph(graph, &quest, stages).map_err(|e| e.to_string())?;
        Ok(quest)
    }

    /// Add a quest and the stages it declares
    pub async fn add_quest(&self, quest: Quest, stages: Vec<Stage>) -> Result<(), QuestError> {
        let mut quests = self.quests.write().await;
        if quests.contains_key(&quest.id()) {
            return Err(QuestError::InvalidDefinition(format!(
                "quest {} is already loaded",
                quest.id()
            )));
        }

        let mut graph = self.graph.write().await;
        add_to_graph(&mut graph, &quest, stages)?;
        validate_links(&graph);

        let mut quest = quest;
        refresh_flags(&mut quest, &graph);
        info!("Added quest: {} ({})", quest.name(), quest.id());
        quests.insert(quest.id(), Arc::new(quest));
        Ok(())
    }

    /// Get a quest by ID
    pub async fn get(&self, quest_id: QuestId) -> Option<Arc<Quest>> {
        let quests = self.quests.read().await;
        quests.get(&quest_id).cloned()
    }

    /// Quests that may be offered to players, sorted by name. Area-locked
    /// quests without an area are left out whatever their cached flags say.
    pub async fn available(&self) -> Vec<Arc<Quest>> {
        let quests = self.quests.read().await;
        let mut available: Vec<_> = quests
            .values()
            .filter(|quest| quest.is_available())
            .filter(|quest| !(quest.is_area_locked() && quest.area().is_none()))
            .cloned()
            .collect();
        available.sort_by(|a, b| a.name().cmp(b.name()));
        available
    }

    /// Every loaded quest, sorted by id
    pub async fn all(&self) -> Vec<Arc<Quest>> {
        let quests = self.quests.read().await;
        let mut all: Vec<_> = quests.values().cloned().collect();
        all.sort_by_key(|quest| quest.id());
        all
    }

    /// Get all quest IDs
    pub async fn all_ids(&self) -> Vec<QuestId> {
        let quests = self.quests.read().await;
        quests.keys().copied().collect()
    }

    /// Get number of loaded quests
    pub async fn count(&self) -> usize {
        self.quests.read().await.len()
    }

    pub async fn stage(&self, stage_id: StageId) -> Option<Stage> {
        self.graph.read().await.get(stage_id).cloned()
    }

    pub async fn is_floating(&self, stage_id: StageId) -> bool {
        self.graph.read().await.is_floating(stage_id)
    }

    pub async fn attachment(&self, stage_id: StageId) -> Option<Attachment> {
        self.graph.read().await.attachment(stage_id)
    }

    /// Quest together with its authored and linked stages
    pub async fn quest_with_stages(&self, quest_id: QuestId) -> Option<(Arc<Quest>, Vec<Stage>)> {
        let quests = self.quests.read().await;
        let graph = self.graph.read().await;
        let quest = quests.get(&quest_id)?.clone();
        let stages = graph
            .quest_stages(&quest)
            .into_iter()
            .filter_map(|id| graph.get(id).cloned())
            .collect();
        Some((quest, stages))
    }

    /// Areas of every quest that has one
    pub async fn areas(&self) -> Vec<Area> {
        let quests = self.quests.read().await;
        quests.values().filter_map(|quest| quest.area().cloned()).collect()
    }

    fn link_lock(&self, quest_id: QuestId) -> Arc<Mutex<()>> {
        self.link_locks.entry(quest_id).or_default().clone()
    }

    /// Attach a floating stage to a quest and refresh the quest's cached
    /// flags. Fails when the stage is attached anywhere already.
    pub async fn link_stage(&self, quest_id: QuestId, stage_id: StageId) -> Result<(), QuestError> {
        let lock = self.link_lock(quest_id);
        let _guard = lock.lock().await;

        let mut quests = self.quests.write().await;
        let quest = quests
            .get_mut(&quest_id)
            .ok_or(QuestError::QuestNotFound(quest_id))?;

        let mut graph = self.graph.write().await;
        graph.link(quest_id, stage_id)?;

        refresh_flags(Arc::make_mut(quest), &graph);
        info!("Linked stage {} into quest {}", stage_id, quest_id);
        Ok(())
    }

    /// Link for a player's stage-link reward. A stage an earlier player
    /// already linked into the same quest is shared, not an error.
    async fn resolve_link(&self, quest_id: QuestId, stage_id: StageId) -> Result<(), QuestError> {
        match self.link_stage(quest_id, stage_id).await {
            Err(QuestError::StageAlreadyAttached {
                attachment: Attachment::Linked { quest },
                ..
            }) if quest == quest_id => Ok(()),
            result => result,
        }
    }

    /// Re-attach the stages active runs have branched into. Links are not
    /// stored with quest definitions, so this runs once player records are
    /// restored. Returns how many links resolved.
    pub async fn restore_links(&self) -> usize {
        let mut wanted: Vec<(QuestId, StageId)> = Vec::new();
        for player in self.players.snapshot_all().await {
            for run in player.runs.values() {
                let stage = match &run.branch {
                    Some(BranchState::FollowingBranch { stage, .. })
                    | Some(BranchState::Completed { stage }) => *stage,
                    _ => continue,
                };
                wanted.push((run.quest_id, stage));
            }
        }
        wanted.sort();
        wanted.dedup();

        let mut restored = 0;
        for (quest_id, stage_id) in wanted {
            match self.resolve_link(quest_id, stage_id).await {
                Ok(()) => restored += 1,
                Err(e) => warn!("Could not restore link of stage {} into quest {}: {}", stage_id, quest_id, e),
            }
        }
        if restored > 0 {
            info!("Restored {} stage links from player runs", restored);
        }
        restored
    }

    /// Start a quest for a player and return the initial progress view
    pub async fn start_quest(&self, host: &HostPlayer, quest_id: QuestId) -> Result<RunView, QuestError> {
        let quest = self
            .get(quest_id)
            .await
            .ok_or(QuestError::QuestNotFound(quest_id))?;

        if quest.is_area_locked() && quest.area().is_none() {
            warn!("Quest '{}' ({}) is area-locked but has no area", quest.name(), quest_id);
            return Err(QuestError::AreaMissing(quest_id));
        }
        if !quest.is_available() {
            return Err(QuestError::QuestUnavailable(quest_id));
        }

        let record = self.players.get_player(host);
        let mut player = record.lock().await;
        if player.is_quest_active(quest_id) {
            return Err(QuestError::AlreadyActive(quest_id));
        }
        if player.is_quest_completed(quest_id) && !quest.is_replayable() {
            return Err(QuestError::NotReplayable(quest_id));
        }

        let graph = self.graph.read().await;
        let run = progress::begin(&quest, &graph);
        let view = progress::view(&quest, &graph, &run);
        player.runs.insert(quest_id, run);

        info!("Player {} started quest '{}'", host.name, quest.name());
        Ok(view)
    }

    pub async fn abandon_quest(&self, player_id: PlayerId, quest_id: QuestId) -> Result<(), QuestError> {
        let record = self
            .players
            .get(player_id)
            .ok_or(QuestError::NotActive(quest_id))?;
        let mut player = record.lock().await;
        player
            .abandon_quest(quest_id)
            .ok_or(QuestError::NotActive(quest_id))?;

        info!("Player {} abandoned quest {}", player.name, quest_id);
        Ok(())
    }

    /// Process a quest event and return any updates
    pub async fn process_event(&self, event: &QuestEvent) -> Vec<ProgressUpdate> {
        let Some(record) = self.players.get(event.player.id) else {
            return Vec::new();
        };
        let mut player = record.lock().await;

        let mut updates = Vec::new();
        for quest_id in player.active_quest_ids() {
            updates.extend(self.advance_run(&mut player, quest_id, event).await);
        }
        updates
    }

    async fn advance_run(
        &self,
        player: &mut QPlayer,
        quest_id: QuestId,
        event: &QuestEvent,
    ) -> Vec<ProgressUpdate> {
        let Some(mut quest) = self.get(quest_id).await else {
            return Vec::new();
        };

        if !quest.allows_progress_at(&event.location, self.ignore_height) {
            if quest.area().is_none() {
                warn!("Quest '{}' ({}) is area-locked but has no area", quest.name(), quest_id);
            }
            debug!("{} for {} ignored outside area of quest {}", event.event_type(), player.name, quest_id);
            return Vec::new();
        }

        // The run is taken out so rewards can borrow the player mutably
        let Some(mut run) = player.runs.remove(&quest_id) else {
            return Vec::new();
        };

        let outcome = {
            let graph = self.graph.read().await;
            progress::apply_event(&graph, &mut run, event)
        };
        if outcome.is_empty() {
            player.runs.insert(quest_id, run);
            return Vec::new();
        }

        let mut links: HashMap<StageId, Vec<StageId>> = HashMap::new();
        {
            let graph = self.graph.read().await;
            for (stage_id, task_id) in &outcome.completed_tasks {
                let Some(task) = graph.get(*stage_id).and_then(|stage| stage.task(task_id)) else {
                    continue;
                };
                let mut ctx = RewardContext::new(player, quest_id);
                for reward in &task.rewards {
                    reward.give(&mut ctx);
                }
                links.entry(*stage_id).or_default().extend(ctx.take_links());
            }
            for stage_id in &outcome.completed_stages {
                let Some(stage) = graph.get(*stage_id) else {
                    continue;
                };
                let mut ctx = RewardContext::new(player, quest_id);
                for reward in &stage.rewards {
                    reward.give(&mut ctx);
                }
                links.entry(*stage_id).or_default().extend(ctx.take_links());
            }
        }

        let mut finished = false;
        for stage_id in &outcome.completed_stages {
            let mut branched = false;
            for target in links.remove(stage_id).unwrap_or_default() {
                if branched {
                    warn!("Stage {} already branched; ignoring link to {}", stage_id, target);
                    continue;
                }
                match self.resolve_link(quest_id, target).await {
                    Ok(()) => {
                        let graph = self.graph.read().await;
                        progress::follow_branch(&graph, &mut run, *stage_id, target);
                        branched = true;
                    }
                    Err(e) => warn!(
                        "Quest {}: could not link stage {} ({}); continuing with authored stages",
                        quest_id, target, e
                    ),
                }
            }

            if branched {
                if let Some(refreshed) = self.get(quest_id).await {
                    quest = refreshed;
                }
            }

            let graph = self.graph.read().await;
            finished = progress::finish_stage(&quest, &graph, &mut run, *stage_id, branched);
        }

        let mut updates = outcome.updates;
        player.runs.insert(quest_id, run);

        if finished {
            let mut ctx = RewardContext::new(player, quest_id);
            for reward in quest.rewards() {
                reward.give(&mut ctx);
            }
            if !ctx.take_links().is_empty() {
                warn!("Quest {} has stage-link rewards on completion; ignored", quest_id);
            }

            player.complete_quest(quest_id);
            for update in &mut updates {
                update.quest_completed = true;
            }
            info!("Player {} completed quest '{}'", player.name, quest.name());
        }

        updates
    }

    /// Progress views of every active run of a player
    pub async fn progress_view(&self, player_id: PlayerId) -> Vec<RunView> {
        let Some(record) = self.players.get(player_id) else {
            return Vec::new();
        };
        let player = record.lock().await;

        let quests = self.quests.read().await;
        let graph = self.graph.read().await;
        player
            .active_quest_ids()
            .into_iter()
            .filter_map(|quest_id| {
                let quest = quests.get(&quest_id)?;
                let run = player.run(quest_id)?;
                Some(progress::view(quest, &graph, run))
            })
            .collect()
    }
}

/// Recursively collect quest files
fn collect_quest_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_quest_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

/// Insert a quest's stages and attach its authored sequence. Nothing is
/// inserted when any check fails.
fn add_to_graph(graph: &mut StageGraph, quest: &Quest, stages: Vec<Stage>) -> Result<(), QuestError> {
    let mut declared = HashSet::new();
    for stage in &stages {
        if graph.contains(stage.id) || !declared.insert(stage.id) {
            return Err(QuestError::DuplicateStage(stage.id));
        }
    }
    for id in quest.stages() {
        if declared.contains(id) {
            continue;
        }
        match graph.attachment(*id) {
            Some(attachment) => {
                return Err(QuestError::StageAlreadyAttached {
                    stage: *id,
                    attachment,
                });
            }
            None if !graph.contains(*id) => return Err(QuestError::StageNotFound(*id)),
            None => {}
        }
    }

    for stage in stages {
        graph.insert(stage)?;
    }
    graph.attach_authored(quest.id(), quest.stages())
}

/// Warn about link targets that can never attach
fn validate_links(graph: &StageGraph) {
    for stage in graph.stages() {
        check_link_targets(stage, graph);
    }
}

fn check_link_targets(stage: &Stage, graph: &StageGraph) {
    for target in stage.branch_candidates() {
        if !graph.contains(target) {
            warn!("Stage '{}' ({}) links to unknown stage {}", stage.name, stage.id, target);
        } else if let Some(Attachment::Authored { quest, .. }) = graph.attachment(target) {
            warn!(
                "Stage '{}' ({}) links to stage {} which is authored in quest {}",
                stage.name, stage.id, target, quest
            );
        }
    }
}

/// Recompute cached flags, branches first since broken state reads them
fn refresh_flags(quest: &mut Quest, graph: &StageGraph) {
    quest.check_branches(graph);
    if quest.evaluate_broken(graph).is_none() {
        warn!("Quest '{}' ({}) is area-locked but has no area", quest.name(), quest.id());
    }
    if quest.check_broken(graph) {
        warn!("Quest '{}' ({}) is broken and will not be offered", quest.name(), quest.id());
    }
}
