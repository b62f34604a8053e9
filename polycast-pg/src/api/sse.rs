//! Server-Sent Events stream

use crate::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

/// GET /events
///
/// Streams every generation event as it happens, with a comment heartbeat
/// every 15 seconds so proxies keep the connection open. A subscriber that
/// falls behind loses the oldest events rather than stalling producers.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Ok(event) => {
                            let event_type = event.event_type().to_string();
                            match serde_json::to_string(&event) {
                                Ok(payload) => {
                                    yield Ok(Event::default().event(event_type).data(payload));
                                }
                                Err(e) => warn!(error = %e, "Could not serialize event"),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "SSE subscriber lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
