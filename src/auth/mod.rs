use crate::state::AppState;
use axum::Router;

pub mod cookies;
pub mod csrf;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod memory;
pub mod middleware;
mod password;
pub mod repo;
pub mod repo_types;
pub mod reset;
pub mod services;
pub mod store;
pub mod token;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
