//! Prometheus metrics for connections, participants, and event handling. Rendered at `GET /metrics`.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::AppState;

/// Owned metric handles. Each instance has its own `Registry` so tests can build many.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub connections_active: IntGauge,
    pub participants_active: IntGauge,
    pub events_total: IntCounterVec,
    pub event_errors_total: IntCounterVec,
    pub deliveries_dropped_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_active =
            IntGauge::new("chat_connections_active", "Open WebSocket connections")?;
        let participants_active =
            IntGauge::new("chat_participants_active", "Participants currently joined")?;
        let events_total = IntCounterVec::new(
            Opts::new("chat_events_total", "Inbound events handled"),
            &["event"],
        )?;
        let event_errors_total = IntCounterVec::new(
            Opts::new("chat_event_errors_total", "Inbound events rejected"),
            &["error"],
        )?;
        let deliveries_dropped_total = IntCounter::new(
            "chat_deliveries_dropped_total",
            "Outbound frames dropped because a connection buffer was full or closed",
        )?;

        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(participants_active.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(event_errors_total.clone()))?;
        registry.register(Box::new(deliveries_dropped_total.clone()))?;

        Ok(Self {
            registry,
            connections_active,
            participants_active,
            events_total,
            event_errors_total,
            deliveries_dropped_total,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("render metrics: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render metrics").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_metrics() {
        let m = Metrics::new().unwrap();
        m.connections_active.inc();
        m.events_total.with_label_values(&["join"]).inc();
        let text = m.render().unwrap();
        assert!(text.contains("chat_connections_active 1"));
        assert!(text.contains(r#"chat_events_total{event="join"} 1"#));
    }

    #[test]
    fn instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.participants_active.set(3);
        assert_eq!(b.participants_active.get(), 0);
    }
}
