mod appointments;
pub mod auth;
mod health;
pub mod negotiate;
pub mod views;
mod votes;

use axum::Router;

use crate::AppState;

/// Create the API router
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(appointments::router())
        .merge(votes::router())
}
