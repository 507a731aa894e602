use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use quest_server::api::{self, AppState};
use quest_server::config::ServerConfig;
use quest_server::player::PlayerHandler;
use quest_server::quest::{QuestRegistry, TaskHandler};
use quest_server::storage::{
    AreaImageBuilder, ImageBuilder, PlayerImageBuilder, QuestImageBuilder, SqliteStorage, Storage,
};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage = match SqliteStorage::new(&config.storage.database_url).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Failed to open database {}: {}", config.storage.database_url, e);
            return;
        }
    };
    if let Err(e) = storage.init().await {
        error!("Failed to initialize storage: {}", e);
        return;
    }

    let players = Arc::new(PlayerHandler::new());
    let registry = QuestRegistry::new(
        &config.quests.data_dir,
        config.quests.ignore_height,
        Arc::new(TaskHandler::with_builtin()),
        players.clone(),
    );

    match registry.load_all().await {
        Ok(count) => info!("Loaded {} quests", count),
        Err(e) => {
            error!("Failed to load quests: {}", e);
            return;
        }
    }

    PlayerImageBuilder::new(storage.clone(), players.clone())
        .restore_all()
        .await;
    registry.restore_links().await;

    // Export read-only images of what was loaded
    if let Err(e) = QuestImageBuilder::new(storage.clone(), registry.clone()).save(None).await {
        warn!("Failed to export quest images: {}", e);
    }
    if let Err(e) = AreaImageBuilder::new(storage.clone(), registry.clone()).save(None).await {
        warn!("Failed to export area images: {}", e);
    }

    let app = api::router(AppState::new(registry, storage)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    );

    let listener = match tokio::net::TcpListener::bind(&config.server.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.server.bind, e);
            return;
        }
    };
    info!("Quest server listening on http://{}", config.server.bind);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
