//! REST endpoint handlers organized by resource.

pub mod broadcast;
pub mod cluster;
pub mod sessions;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(sessions::routes())
        .merge(broadcast::routes())
        .merge(cluster::routes())
}
