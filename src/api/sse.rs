//! Server-Sent Events support

use crate::runtime::{SessionSnapshot, SessionUpdate};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Current session first, then every update broadcast for it
pub fn sse_stream(
    init: SessionSnapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionUpdate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move { Ok(init_event(&init)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(update) => Some(Ok(update_event(update))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn init_event(session: &SessionSnapshot) -> Event {
    let data = json!({
        "type": "init",
        "session": session,
    });
    Event::default().event("init").data(data.to_string())
}

fn update_event(update: SessionUpdate) -> Event {
    let (event_type, data) = match update {
        SessionUpdate::Transcript { transcript } => (
            "transcript",
            json!({
                "type": "transcript",
                "transcript": transcript
            }),
        ),
        SessionUpdate::Warning { message } => (
            "warning",
            json!({
                "type": "warning",
                "message": message
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
