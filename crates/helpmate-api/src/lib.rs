pub mod error;
pub mod messages;
pub mod middleware;
pub mod services;
pub mod users;

mod convert;
pub mod extract;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tracing::error;

use helpmate_db::Database;
use helpmate_gateway::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

/// REST routes. Mutations and messaging sit behind `require_auth`; browsing
/// listings and profiles is public.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/services", get(services::list_services))
        .route("/users/{user_id}", get(users::get_profile))
        .route("/users/{user_id}/services", get(services::list_user_services));

    let protected_routes = Router::new()
        .route("/services", post(services::create_service))
        .route(
            "/services/{service_id}",
            put(services::update_service).delete(services::delete_service),
        )
        .route("/users/me", put(users::upsert_profile))
        .route("/messages/send/{receiver_id}", post(messages::send_message))
        .route("/messages/{other_user_id}", get(messages::get_messages))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
}
