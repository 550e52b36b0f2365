use crate::state::AppState;
use axum::Router;

pub mod claims;
mod dto;
pub mod errors;
pub mod handlers;
pub mod jwt;
pub mod memory;
pub(crate) mod middleware;
pub mod password;
pub mod repo;
pub mod repo_types;
mod services;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::profile_routes(state))
}
