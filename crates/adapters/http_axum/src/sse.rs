//! Server-Sent Events stream of one organization's live events.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::{Stream, StreamExt};

use fieldhub_domain::error::ValidationError;
use fieldhub_domain::event::Event;
use fieldhub_domain::id::OrganizationId;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/organizations/{org_id}/events`
///
/// Every frame is named after the event type and carries the JSON-encoded
/// event. Events of other organizations are filtered out. A slow client
/// that lags behind the bus skips the dropped events and keeps streaming.
/// The stream ends when the server shuts down.
pub async fn stream(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let organization_id: OrganizationId = org_id
        .parse()
        .map_err(|_| ValidationError::InvalidId(org_id.clone()))?;

    tracing::debug!(%organization_id, "live event subscriber connected");
    let frames = BroadcastStream::new(state.event_bus.subscribe())
        .filter_map(move |result| match result {
            Ok(event) if event.organization_id == organization_id => to_frame(&event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(%organization_id, skipped, "SSE subscriber lagged, events dropped");
                None
            }
        })
        .map(Some);
    let stop = WatchStream::new(state.shutdown)
        .filter(|stopping| *stopping)
        .map(|_| None);

    let events = frames
        .merge(stop)
        .take_while(Option::is_some)
        .filter_map(|frame| frame);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_frame(event: &Event) -> Option<Result<SseEvent, Infallible>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Ok(SseEvent::default()
            .event(event.event_type.as_str())
            .data(json))),
        Err(err) => {
            tracing::warn!(%err, "failed to serialize event for SSE stream");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tokio::sync::watch;
    use tower::ServiceExt;

    use fieldhub_app::event_bus::InProcessEventBus;
    use fieldhub_app::ports::EventPublisher;
    use fieldhub_domain::event::EventType;

    use super::*;
    use crate::router;

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn should_reject_malformed_organization_id() {
        let (_tx, rx) = watch::channel(false);
        let app = router::build(AppState::new(Arc::new(InProcessEventBus::new(8)), rx));

        let response = app
            .oneshot(request("/api/organizations/not-a-uuid/events"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_stream_only_events_of_requested_organization() {
        let (_tx, rx) = watch::channel(false);
        let bus = Arc::new(InProcessEventBus::new(8));
        let app = router::build(AppState::new(Arc::clone(&bus), rx));
        let org = OrganizationId::new();

        let response = app
            .oneshot(request(&format!("/api/organizations/{org}/events")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        bus.publish(Event::new(
            OrganizationId::new(),
            EventType::Telemetry,
            serde_json::json!({"power_w": 1.0}),
        ))
        .await
        .unwrap();
        bus.publish(Event::new(
            org,
            EventType::DeviceStatus,
            serde_json::json!({"is_online": false}),
        ))
        .await
        .unwrap();

        let mut body = response.into_body().into_data_stream();
        let frame = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();

        assert!(text.starts_with("event: device_status\n"));
        assert!(text.contains(&org.to_string()));
        assert!(!text.contains("power_w"));
    }

    #[tokio::test]
    async fn should_end_stream_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let app = router::build(AppState::new(Arc::new(InProcessEventBus::new(8)), rx));

        let response = app
            .oneshot(request(&format!(
                "/api/organizations/{}/events",
                OrganizationId::new()
            )))
            .await
            .unwrap();
        tx.send(true).unwrap();

        let mut body = response.into_body().into_data_stream();
        let next = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .unwrap();

        assert!(next.is_none());
    }
}
