pub mod appresult;
pub mod channel;
pub mod config;
pub mod db;
pub mod directory;
pub mod events;
pub mod retention;
pub mod rooms;
pub mod session;
pub mod store;
pub mod typing;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use appresult::{AppError, AppResult, ChatError, ChatResult};
pub use channel::RoomChannel;
pub use config::Config;
pub use directory::{RoomCode, RoomDirectory};
pub use store::MessageStore;
pub use typing::TypingRelay;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub directory: RoomDirectory,
    pub store: MessageStore,
    pub channel: RoomChannel,
    pub typing: TypingRelay,
}

impl AppState {
    pub fn new(db_pool: SqlitePool) -> Self {
        let channel = RoomChannel::new();
        AppState {
            directory: RoomDirectory::new(db_pool.clone()),
            store: MessageStore::new(db_pool.clone()),
            typing: TypingRelay::new(channel.clone()),
            channel,
            db_pool,
        }
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .nest("/api", rooms::router())
        .route("/ws", get(rooms::ws::room_ws))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

pub fn cors(config: &Config) -> CorsLayer {
    let origins = if config.production {
        let allowed: Vec<HeaderValue> = config
            .allowed_origins()
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect();
        AllowOrigin::list(allowed)
    } else {
        AllowOrigin::mirror_request()
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_TYPE])
}

/// Resolves once `signal` fires. If the signal cannot be listened for, this
/// never resolves and the server keeps running.
pub async fn shutdown_signal(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "cannot listen for ctrl-c, graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn hello() -> Json<Value> {
    Json(json!({ "message": "Chat App Backend API" }))
}
