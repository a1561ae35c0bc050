use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use ember_api::auth::{self, AppState, AppStateInner};
use ember_api::matches;
use ember_api::middleware::require_auth;
use ember_api::profile;
use ember_gateway::connection;
use ember_gateway::dispatcher::Dispatcher;
use ember_match::MatchEngine;
use ember_match::engine::DEFAULT_MAX_MESSAGE_LEN;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("EMBER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("EMBER_DB_PATH").unwrap_or_else(|_| "ember.db".into());
    let host = std::env::var("EMBER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("EMBER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let max_message_len: usize = std::env::var("EMBER_MAX_MESSAGE_LEN")
        .unwrap_or_else(|_| DEFAULT_MAX_MESSAGE_LEN.to_string())
        .parse()?;

    // Init database
    let db = Arc::new(ember_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state: the dispatcher is both the gateway's connection table
    // and the engine's event sink
    let dispatcher = Dispatcher::new();
    let engine = MatchEngine::new(db.clone(), Arc::new(dispatcher.clone()), max_message_len);

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        engine,
        jwt_secret: jwt_secret.clone(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/matches/like/{user_id}", post(matches::like))
        .route("/matches/dislike/{user_id}", post(matches::dislike))
        .route("/matches", get(matches::list_matches))
        .route("/matches/{match_id}", delete(matches::unmatch))
        .route("/matches/{match_id}/messages", get(matches::get_messages))
        .route("/matches/{match_id}/messages", post(matches::send_message))
        .route("/profile/discover", get(profile::discover))
        .route("/profile/preferences", put(profile::update_preferences))
        .route("/profile/{user_id}", get(profile::get_profile))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ServerState {
            dispatcher,
            jwt_secret,
        });

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Ember server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
