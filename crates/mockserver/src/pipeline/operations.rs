//! The ietf-subscribed-notifications operations: establish-subscription and
//! delete-subscription.

use super::Failure;
use crate::App;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use restconf::{
    DeleteSubscriptionRequest, EstablishSubscriptionRequest, EstablishSubscriptionResponse,
    ENCODE_JSON,
};

pub fn establish(app: &App, url: &str, body: Option<&[u8]>) -> Response {
    let Some(body) = body else {
        return Failure::malformed(url, "request body is required").into_response();
    };
    let request: EstablishSubscriptionRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(error) => {
            return Failure::malformed(url, format!("malformed subscription body: {error}"))
                .into_response()
        }
    };

    let input = request.input;
    if !input.encoding.is_empty() && input.encoding != ENCODE_JSON {
        tracing::debug!(encoding = %input.encoding, "rejecting unsupported encoding");
        return Failure::encoding_unsupported(url).into_response();
    }

    match app.center.subscribe(&input.subscriptions.subscription) {
        Ok(id) => {
            tracing::info!(subscription = id, "subscription established");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, restconf::YANG_DATA_JSON)],
                axum::Json(EstablishSubscriptionResponse::new(id)),
            )
                .into_response()
        }
        Err(error) => {
            tracing::error!(?error, "failed to persist subscription table");
            Failure::internal(url, "failed to persist subscription").into_response()
        }
    }
}

pub fn delete(app: &App, url: &str, body: Option<&[u8]>) -> Response {
    let Some(body) = body else {
        return Failure::malformed(url, "request body is required").into_response();
    };
    let request: DeleteSubscriptionRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(error) => {
            return Failure::malformed(url, format!("malformed subscription body: {error}"))
                .into_response()
        }
    };

    match app.center.delete(request.input.id) {
        Ok(true) => {
            tracing::info!(subscription = request.input.id, "subscription deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => Failure::no_such_subscription(url).into_response(),
        Err(error) => {
            tracing::error!(?error, "failed to persist subscription table");
            Failure::internal(url, "failed to persist subscription").into_response()
        }
    }
}
