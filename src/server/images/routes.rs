use super::handlers;
use crate::server::state::AppState;
use axum::{routing::get, Router};

pub fn routes(base: &str) -> Router<AppState> {
    Router::new().route(
        &format!("{}/tar", base),
        get(handlers::get_tar).post(handlers::post_tar),
    )
}
