//! Route handlers.

pub mod entities;
pub mod graph;
pub mod health;
pub mod recommendations;
pub mod tabs;

use axum::http::StatusCode;

/// Map an internal failure onto a 500 response.
pub(crate) fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
