pub mod auth;
pub mod contacts;
pub mod conversations;
pub mod groups;
pub mod messages;
pub mod users;

use axum::extract::State;
use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::{middleware, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::auth_middleware;
use crate::gateway;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let public = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(gateway::ws_upgrade))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout));

    let protected = Router::new()
        .route("/api/users/me", get(users::me).put(users::update_me))
        .route("/api/users/search", get(users::search))
        .route("/api/users/{id}", get(users::get_by_id))
        .route("/api/conversations/direct", post(conversations::create_direct))
        .route("/api/conversations", get(conversations::list))
        .route("/api/conversations/{id}", get(conversations::get_one))
        .route("/api/conversations/{id}/messages", get(conversations::messages))
        .route("/api/groups", post(groups::create))
        .route("/api/groups/{id}", get(groups::get_one).put(groups::update))
        .route("/api/groups/{id}/members", post(groups::add_members))
        .route("/api/groups/{id}/members/{user_id}", delete(groups::remove_member))
        .route("/api/groups/{id}/members/{user_id}/role", put(groups::update_role))
        .route("/api/messages/{id}", put(messages::edit).delete(messages::delete))
        .route("/api/messages/forward", post(messages::forward))
        .route("/api/messages/search", get(messages::search))
        .route("/api/notifications/unread", get(messages::unread_summary))
        .route("/api/contacts", get(contacts::list).post(contacts::add))
        .route("/api/contacts/{user_id}", delete(contacts::remove))
        .route("/api/blocks", get(contacts::list_blocks).post(contacts::add_block))
        .route("/api/blocks/{user_id}", delete(contacts::remove_block))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
    ws_connections: usize,
    online_users: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.uptime_secs(),
        ws_connections: state.hub.connection_count().await,
        online_users: state.hub.online_user_count().await,
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state.clone());

    info!(addr = %addr, "Starting HTTP/WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received, closing connections");
    state.hub.close_all().await;
}
