pub mod dto;
pub mod errors;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validation;
pub mod views;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
