use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use clap::Parser;
use lectern_core::{LectureId, LectureStatus};
use lectern_server::{MemoryLectureDirectory, RoomConfig, RoomRegistry, ws_handler};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lectern-server", about = "Live lecture signaling server")]
struct Args {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Maximum participants per room
    #[arg(long, default_value_t = 100)]
    max_participants: usize,

    /// Maximum chat message length in bytes
    #[arg(long, default_value_t = 2000)]
    max_chat_len: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let directory = Arc::new(MemoryLectureDirectory::new());
    let registry = RoomRegistry::new(
        directory.clone(),
        RoomConfig {
            max_participants: args.max_participants,
            max_chat_len: args.max_chat_len,
        },
    );

    // Browser clients connect from the course frontend's origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws/lecture/{lecture_id}", get(ws_handler))
        .with_state(registry)
        .merge(lecture_routes(directory))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!("signaling server listening on http://{}", args.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Stand-in for the course platform's lecture CRUD: registering a lecture
/// and driving its status so joins can be accepted.
fn lecture_routes(directory: Arc<MemoryLectureDirectory>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/lectures/{id}", post(register_lecture))
        .route("/lectures/{id}/status", put(set_lecture_status))
        .with_state(directory)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "lectern-server",
    }))
}

async fn register_lecture(
    Path(id): Path<String>,
    State(directory): State<Arc<MemoryLectureDirectory>>,
) -> StatusCode {
    directory.register(LectureId::from(id));
    StatusCode::CREATED
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: LectureStatus,
}

async fn set_lecture_status(
    Path(id): Path<String>,
    State(directory): State<Arc<MemoryLectureDirectory>>,
    Json(update): Json<StatusUpdate>,
) -> Result<StatusCode, (StatusCode, String)> {
    use lectern_server::LectureDirectory;

    directory
        .set_status(&LectureId::from(id), update.status)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}
