use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::AppState;

/// Live notification feed. Each SSE event carries a stored record, with its
/// cursor `seq` as the event id and the notification kind as the event name.
/// A client that drops or lags resumes through `GET /v1/notifications?since=`
/// — the stream is delivery, the ledger is truth.
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.core.hub.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(stored) => {
                    match Event::default()
                        .id(stored.seq.to_string())
                        .event(stored.kind.as_str())
                        .json_data(&stored)
                    {
                        Ok(event) => yield Ok(event),
                        Err(e) => warn!(error = %e, "dropping unserializable notification"),
                    }
                }
                // The subscriber fell behind the channel; it recovers by
                // cursor, so stay subscribed instead of closing the stream.
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "sse subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
