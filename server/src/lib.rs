//! HTTP layer for Revision Desk.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/` | landing page |
//! | GET | `/health` | liveness JSON |
//! | GET/POST | `/upload` | upload form / multipart upload |
//! | GET | `/requests` | request list |
//! | GET | `/requests/:id` | detail with review forms |
//! | POST | `/requests/:id/edit` | manual field edit, rescored |
//! | POST | `/requests/:id/approve`, `/reject` | decision |
//! | GET | `/requests/:id/download` | original upload |
//! | GET | `/requests/:id/presentation` | generated brief |
//! | GET | `/dashboard` | projects with approved revisions |
//! | GET | `/api/requests/:id` | JSON view with audit log |

#![allow(clippy::missing_errors_doc)]

mod error;
pub mod pipeline;
mod routes;
mod state;
pub mod views;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use pipeline::process_request;
pub use state::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .settings
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/upload", get(routes::upload_form).post(routes::upload))
        .route("/requests", get(routes::list_requests))
        .route("/requests/:id", get(routes::request_detail))
        .route("/requests/:id/edit", post(routes::edit_request))
        .route("/requests/:id/approve", post(routes::approve))
        .route("/requests/:id/reject", post(routes::reject))
        .route("/requests/:id/download", get(routes::download_original))
        .route(
            "/requests/:id/presentation",
            get(routes::download_presentation),
        )
        .route("/dashboard", get(routes::dashboard))
        .route("/api/requests/:id", get(routes::api_request))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
