//! Server-Sent Events (SSE) handler.
//!
//! Subscribes to the [`tf_core::events::EventBus`], optionally filters by
//! pipeline stage, replays recent events for late joiners, and sends
//! keepalive heartbeats.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;

use tf_core::events::EventCategory;

use crate::context::AppContext;

/// Number of buffered events replayed to a new subscriber.
const REPLAY: usize = 50;

/// Optional query parameter for category filtering.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Filter events by stage: "intake", "branch", "join" or "notify".
    pub category: Option<String>,
}

/// GET /api/events -- SSE stream of pipeline activity.
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    // Unknown categories pass everything through.
    let filter = params.category.as_deref().and_then(EventCategory::parse);

    let recent = ctx.event_bus.recent_events(REPLAY);
    let mut rx = ctx.event_bus.subscribe();

    let stream = async_stream::stream! {
        // Oldest first.
        for event in recent.into_iter().rev() {
            if matches_category(event.category, filter) {
                if let Ok(data) = serde_json::to_string(&event) {
                    yield Ok(Event::default().data(data));
                }
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if matches_category(event.category, filter) {
                                if let Ok(data) = serde_json::to_string(&event) {
                                    yield Ok(Event::default().data(data));
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn matches_category(category: EventCategory, filter: Option<EventCategory>) -> bool {
    filter.map_or(true, |f| f == category)
}
