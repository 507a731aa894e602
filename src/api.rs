//! HTTP API
//!
//! JSON endpoints the host server uses to list quests, drive player runs and
//! report player actions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::area::Location;
use crate::error::QuestError;
use crate::player::{HostPlayer, PlayerHandler, PlayerId, QPlayer};
use crate::quest::events::QuestAction;
use crate::quest::state::RunView;
use crate::quest::{ProgressUpdate, QuestEvent, QuestId, QuestRegistry};
use crate::storage::{ImageBuilder, PlayerImageBuilder, QuestImage, Storage};

// ============================================================================
// App State
// ============================================================================

pub struct AppState<S> {
    pub registry: Arc<QuestRegistry>,
    pub players: Arc<PlayerHandler>,
    pub storage: Arc<S>,
    saves: Arc<PlayerSaves>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            players: self.players.clone(),
            storage: self.storage.clone(),
            saves: self.saves.clone(),
        }
    }
}

/// Versions of background player saves. A snapshot older than the last one
/// written for that player is dropped.
#[derive(Default)]
struct PlayerSaves {
    next: AtomicU64,
    written: DashMap<PlayerId, Arc<Mutex<u64>>>,
}

impl<S: Storage> AppState<S> {
    pub fn new(registry: Arc<QuestRegistry>, storage: Arc<S>) -> Self {
        Self {
            players: registry.players().clone(),
            registry,
            storage,
            saves: Arc::new(PlayerSaves::default()),
        }
    }

    /// Snapshot the player now and write the image in the background
    async fn persist_player(&self, player_id: PlayerId) {
        let Some(record) = self.players.get(player_id) else {
            return;
        };
        let (player, version) = {
            let player = record.lock().await;
            (player.clone(), self.saves.next.fetch_add(1, Ordering::SeqCst) + 1)
        };

        let slot = self.saves.written.entry(player_id).or_default().clone();
        let images = PlayerImageBuilder::new(self.storage.clone(), self.players.clone());
        tokio::spawn(write_player(slot, version, images, player));
    }
}

async fn write_player<S: Storage>(
    slot: Arc<Mutex<u64>>,
    version: u64,
    images: PlayerImageBuilder<S>,
    player: QPlayer,
) {
    let mut written = slot.lock().await;
    if *written > version {
        debug!("Skipping stale save of player {}", player.id);
        return;
    }
    match images.save(Some(&player)).await {
        Ok(_) => *written = version,
        Err(e) => warn!("Failed to save player {}: {}", player.id, e),
    }
}

pub fn router<S: Storage>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/quests", get(list_quests::<S>))
        .route("/api/quests/:quest_id", get(get_quest::<S>))
        .route("/api/players/:player_id/quests", get(player_quests::<S>))
        .route("/api/players/:player_id/quests/:quest_id/start", post(start_quest::<S>))
        .route("/api/players/:player_id/quests/:quest_id/abandon", post(abandon_quest::<S>))
        .route("/api/players/:player_id/events", post(player_event::<S>))
        .with_state(state)
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> ApiResult<T> {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
    )
}

fn failure<T>(error: QuestError) -> ApiResult<T> {
    (
        error_status(&error),
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }),
    )
}

fn error_status(error: &QuestError) -> StatusCode {
    match error {
        QuestError::QuestNotFound(_) | QuestError::StageNotFound(_) => StatusCode::NOT_FOUND,
        QuestError::AlreadyActive(_)
        | QuestError::NotReplayable(_)
        | QuestError::NotActive(_)
        | QuestError::StageAlreadyAttached { .. }
        | QuestError::DuplicateStage(_) => StatusCode::CONFLICT,
        QuestError::QuestUnavailable(_)
        | QuestError::AreaMissing(_)
        | QuestError::UnknownExtension(_)
        | QuestError::InvalidDefinition(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestSummary {
    pub id: QuestId,
    pub name: String,
    pub description: String,
    pub area_locked: bool,
    pub replayable: bool,
    pub branching: bool,
    pub stage_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct StartQuestRequest {
    /// Display name of the player, used when the record is first created
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayerEventRequest {
    pub name: String,
    pub location: Location,
    pub action: QuestAction,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis()
    }))
}

/// GET /api/quests - Quests players can start
async fn list_quests<S: Storage>(State(state): State<AppState<S>>) -> ApiResult<Vec<QuestSummary>> {
    let quests = state
        .registry
        .available()
        .await
        .into_iter()
        .map(|quest| QuestSummary {
            id: quest.id(),
            name: quest.name().to_string(),
            description: quest.description().to_string(),
            area_locked: quest.is_area_locked(),
            replayable: quest.is_replayable(),
            branching: quest.has_branches(),
            stage_count: quest.stages().len(),
        })
        .collect();
    ok(quests)
}

/// GET /api/quests/:quest_id
async fn get_quest<S: Storage>(
    State(state): State<AppState<S>>,
    Path(quest_id): Path<Uuid>,
) -> ApiResult<QuestImage> {
    let quest_id = QuestId(quest_id);
    match state.registry.quest_with_stages(quest_id).await {
        Some((quest, stages)) => ok(QuestImage::capture(&quest, &stages)),
        None => failure(QuestError::QuestNotFound(quest_id)),
    }
}

/// GET /api/players/:player_id/quests - Progress of every active run
async fn player_quests<S: Storage>(
    State(state): State<AppState<S>>,
    Path(player_id): Path<Uuid>,
) -> ApiResult<Vec<RunView>> {
    ok(state.registry.progress_view(PlayerId(player_id)).await)
}

/// POST /api/players/:player_id/quests/:quest_id/start
async fn start_quest<S: Storage>(
    State(state): State<AppState<S>>,
    Path((player_id, quest_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<StartQuestRequest>,
) -> ApiResult<RunView> {
    let host = HostPlayer::new(PlayerId(player_id), req.name);
    match state.registry.start_quest(&host, QuestId(quest_id)).await {
        Ok(view) => {
            state.persist_player(host.id).await;
            ok(view)
        }
        Err(e) => {
            debug!("Start of quest {} for {} refused: {}", quest_id, host.name, e);
            failure(e)
        }
    }
}

/// POST /api/players/:player_id/quests/:quest_id/abandon
async fn abandon_quest<S: Storage>(
    State(state): State<AppState<S>>,
    Path((player_id, quest_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<QuestId> {
    let player_id = PlayerId(player_id);
    let quest_id = QuestId(quest_id);
    match state.registry.abandon_quest(player_id, quest_id).await {
        Ok(()) => {
            state.persist_player(player_id).await;
            ok(quest_id)
        }
        Err(e) => failure(e),
    }
}

/// POST /api/players/:player_id/events - Report a player action
async fn player_event<S: Storage>(
    State(state): State<AppState<S>>,
    Path(player_id): Path<Uuid>,
    Json(req): Json<PlayerEventRequest>,
) -> ApiResult<Vec<ProgressUpdate>> {
    let event = QuestEvent::new(
        HostPlayer::new(PlayerId(player_id), req.name),
        req.location,
        req.action,
    );
    let updates = state.registry.process_event(&event).await;
    if !updates.is_empty() {
        state.persist_player(event.player.id).await;
    }
    ok(updates)
}
