//! HTTP surface.
//!
//! | method | path                   | body                                   |
//! |--------|------------------------|----------------------------------------|
//! | POST   | `/api/chat`            | [`ChatBody`] → [`ChatReply`]           |
//! | POST   | `/api/chat/stream`     | [`ChatBody`] → server-sent events      |
//! | DELETE | `/api/session/:id`     | → `{"status":"deleted"}`               |
//! | GET    | `/api/health`          | → `{"status":"ok","agents":[...]}`     |

mod error;
mod handlers;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{delete, get, post};
use kchat::ChatService;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ConfigError;

pub use error::ApiError;
pub use handlers::{ChatBody, ChatReply, HealthReply, ResourceMap, StatusReply};

#[derive(Debug, Clone)]
pub struct AppState {
    pub chat: ChatService,
}

/// Builds the API router with CORS restricted to `allowed_origins`.
pub fn router(chat: ChatService, allowed_origins: &[String]) -> Result<Router, ConfigError> {
    Ok(Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/stream", post(handlers::chat_stream))
        .route("/api/session/:session_id", delete(handlers::end_session))
        .route("/api/health", get(handlers::health))
        .layer(cors_layer(allowed_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { chat }))
}

pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ConfigError> {
    if allowed_origins.is_empty() {
        return Err(ConfigError::invalid("CORS_ALLOWED_ORIGINS is empty"));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            if origin == "*" {
                return Err(ConfigError::invalid(
                    "CORS_ALLOWED_ORIGINS must not contain the wildcard '*'",
                ));
            }
            origin
                .parse::<HeaderValue>()
                .map_err(|_| ConfigError::invalid(format!("CORS origin '{origin}' is not a valid header value")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}
