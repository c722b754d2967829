//! HTTP JSON surface over the session protocols.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{Method, header};
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::common::ProtocolError;

pub mod session_service;

pub fn router(app: App) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    session_service::routes().layer(cors).with_state(app)
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = self.to_status();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
