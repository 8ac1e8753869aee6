mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use helpmate_api::error::ApiError;
use helpmate_api::middleware::{bearer_token, verify_token};
use helpmate_api::{AppState, AppStateInner};
use helpmate_gateway::Dispatcher;
use helpmate_gateway::connection;
use helpmate_types::api::Claims;

use crate::config::Config;

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helpmate=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.addr()?;

    let db = helpmate_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        dispatcher: Dispatcher::new(),
    });

    let app = app(state);

    info!("Helpmate server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    Router::new()
        .merge(helpmate_api::router(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also travel as `?token=`. The query parameter wins when both are present.
fn gateway_claims(
    secret: &str,
    params: &GatewayParams,
    headers: &HeaderMap,
) -> Result<Claims, ApiError> {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(headers))
        .ok_or(ApiError::Unauthorized)?;

    verify_token(secret, token).map_err(|e| {
        warn!("Gateway handshake rejected: {}", e);
        ApiError::Unauthorized
    })
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match gateway_claims(&state.jwt_secret, &params, &headers) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, claims.sub, claims.username)
    })
}
