//! The diff-and-broadcast trigger: compares the two snapshot files and
//! pushes the resulting change events to every subscribed SSE client.

use crate::App;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

pub async fn handle(State(app): State<Arc<App>>) -> Response {
    let prior = match read_snapshot(&app.settings.snapshot_previous).await {
        Ok(snapshot) => snapshot,
        Err(response) => return response,
    };
    let current = match read_snapshot(&app.settings.snapshot_after).await {
        Ok(snapshot) => snapshot,
        Err(response) => return response,
    };

    let events = topodiff::diff(&prior, &current);
    let mut delivered = 0;
    for event in &events {
        delivered += app.center.send_all(
            event.object_type,
            event.operation,
            &event.ids,
            event.value.clone(),
        );
    }
    tracing::info!(events = events.len(), delivered, "change trigger processed");

    StatusCode::NO_CONTENT.into_response()
}

async fn read_snapshot(path: &std::path::Path) -> Result<serde_json::Value, Response> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(?path, "snapshot file missing");
            return Err(StatusCode::NOT_FOUND.into_response());
        }
        Err(error) => {
            tracing::error!(?error, ?path, "failed to read snapshot");
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };
    serde_json::from_slice(&bytes).map_err(|error| {
        tracing::error!(?error, ?path, "snapshot is not valid JSON");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}
