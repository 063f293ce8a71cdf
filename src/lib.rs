//! Single-room chat backend: presence registry, broadcast coordinator, and the WebSocket transport around them.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod presence;
pub mod protocol;
pub mod serde_id_string;
pub mod ws_registry;

use config::Config;
use coordinator::Coordinator;
use metrics::Metrics;
use presence::PresenceRegistry;
use ws_registry::ConnectionRegistry;

/// Process-wide state. Everything is created once in `AppState::new` and shared by handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub presence: Arc<PresenceRegistry>,
    pub coordinator: Arc<Coordinator>,
    pub connections: Arc<ConnectionRegistry>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, prometheus::Error> {
        let metrics = Metrics::new()?;
        let presence = Arc::new(PresenceRegistry::new());
        let coordinator = Arc::new(Coordinator::new(
            presence.clone(),
            metrics.clone(),
            config.max_message_len,
        ));
        let connections = Arc::new(ConnectionRegistry::new(config.send_buffer, metrics.clone()));
        Ok(Self {
            config: Arc::new(config),
            presence,
            coordinator,
            connections,
            metrics,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_allow_origin.as_deref());
    Router::new()
        .route("/health", get(handlers::health))
        .route("/users", get(handlers::users::get_users))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/ws", get(handlers::ws::ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow = match origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(_)) => {
            tracing::warn!(?origin, "CORS_ALLOW_ORIGIN is not a valid header value, allowing any");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };
    CorsLayer::new().allow_origin(allow).allow_methods(Any)
}
