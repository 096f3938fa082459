use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tandem_api::auth::{self, AppState, AppStateInner};
use tandem_api::middleware::require_auth;
use tandem_api::{media, messages, sessions};
use tandem_db::Database;
use tandem_gateway::{SnapshotSource, connection, dispatcher::Dispatcher};
use tandem_media::{Storage, cleanup};
use tandem_types::models::Session;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Snapshot-on-subscribe reads go straight to the store.
struct DbSnapshots(Arc<Database>);

impl SnapshotSource for DbSnapshots {
    fn latest(&self, session_code: &str) -> anyhow::Result<Option<Session>> {
        self.0.load_session(session_code)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("TANDEM_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("TANDEM_DB_PATH").unwrap_or_else(|_| "tandem.db".into());
    let host = std::env::var("TANDEM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TANDEM_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let media_dir = std::env::var("TANDEM_MEDIA_DIR").unwrap_or_else(|_| "media".into());
    let cleanup_interval: u64 = std::env::var("TANDEM_CLEANUP_INTERVAL_SECS")
        .unwrap_or_else(|_| "30".into())
        .parse()?;

    // Init database and media storage
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);
    let storage = Arc::new(Storage::new(PathBuf::from(&media_dir)).await?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        storage: storage.clone(),
        jwt_secret,
    });

    // Expired media bytes are swept in the background; the API answers
    // Expired from the message record regardless of sweep timing.
    tokio::spawn(cleanup::run_cleanup_loop(
        db.clone(),
        storage.clone(),
        cleanup_interval,
    ));

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/{code}", get(sessions::get_session))
        .route("/sessions/{code}/join", post(sessions::join_session))
        .route("/sessions/{code}/complete", post(sessions::complete_challenge))
        .route("/sessions/{code}/skip", post(sessions::skip_challenge))
        .route("/sessions/{code}/ad-change", post(sessions::watch_ad_for_change))
        .route("/sessions/{code}/abandon", post(sessions::abandon_session))
        .route(
            "/sessions/{code}/partner-challenge/request",
            post(sessions::request_partner_challenge),
        )
        .route(
            "/sessions/{code}/partner-challenge/cancel",
            post(sessions::cancel_partner_challenge_request),
        )
        .route(
            "/sessions/{code}/partner-challenge",
            post(sessions::submit_partner_challenge),
        )
        .route(
            "/sessions/{code}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/sessions/{code}/messages/read", post(messages::mark_all_read))
        .route("/sessions/{code}/messages/unread", get(messages::unread_count))
        .route(
            "/sessions/{code}/media",
            post(messages::send_media).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/sessions/{code}/media/{message_id}/download",
            post(media::download_media),
        )
        .route("/sessions/{code}/media/{message_id}", get(media::get_media))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let ws_route = Router::new().route("/gateway", get(ws_upgrade));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Tandem server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let snapshots: Arc<dyn SnapshotSource> = Arc::new(DbSnapshots(state.db.clone()));
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            snapshots,
            state.jwt_secret.clone(),
        )
    })
}
