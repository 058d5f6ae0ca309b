//! The RESTCONF request pipeline: route resolution, body capture, external
//! validation, per-verb dispatch against the datastore, and RESTCONF-shaped
//! error responses.

pub mod data;
pub mod operations;
pub mod options;

use crate::App;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use restconf::{errors::tag, ErrorType, Errors, RestconfError};
use std::collections::BTreeMap;
use std::sync::Arc;

const ESTABLISH_SUBSCRIPTION: &str =
    "operations/ietf-subscribed-notifications:establish-subscription";
const DELETE_SUBSCRIPTION: &str =
    "operations/ietf-subscribed-notifications:delete-subscription";

/// Failure is a terminal pipeline outcome: an HTTP status plus the RESTCONF
/// error body explaining it.
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    errors: Errors,
}

impl Failure {
    fn new(status: StatusCode, error: RestconfError) -> Failure {
        Failure {
            status,
            errors: Errors::of(error),
        }
    }

    pub fn route_not_found(url: &str) -> Failure {
        Failure::new(
            StatusCode::NOT_FOUND,
            RestconfError::new(ErrorType::Protocol, tag::INVALID_VALUE)
                .with_path(url)
                .with_message("Route not found"),
        )
    }

    pub fn not_found(url: &str, message: impl Into<String>) -> Failure {
        Failure::new(
            StatusCode::NOT_FOUND,
            RestconfError::new(ErrorType::Protocol, tag::INVALID_VALUE)
                .with_path(url)
                .with_message(message),
        )
    }

    pub fn malformed(url: &str, message: impl Into<String>) -> Failure {
        Failure::new(
            StatusCode::BAD_REQUEST,
            RestconfError::new(ErrorType::Protocol, tag::INVALID_VALUE)
                .with_path(url)
                .with_message(message),
        )
    }

    pub fn method_not_allowed(url: &str) -> Failure {
        Failure::new(
            StatusCode::METHOD_NOT_ALLOWED,
            RestconfError::new(ErrorType::Protocol, tag::OPERATION_NOT_SUPPORTED)
                .with_path(url)
                .with_message("Method not allowed for this resource"),
        )
    }

    pub fn conflict(url: &str, message: impl Into<String>) -> Failure {
        Failure::new(
            StatusCode::CONFLICT,
            RestconfError::new(ErrorType::Protocol, tag::RESOURCE_DENIED)
                .with_path(url)
                .with_message(message),
        )
    }

    pub fn internal(url: &str, message: impl Into<String>) -> Failure {
        Failure::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            RestconfError::new(ErrorType::Application, tag::OPERATION_FAILED)
                .with_path(url)
                .with_message(message),
        )
    }

    pub fn no_such_subscription(url: &str) -> Failure {
        Failure::new(
            StatusCode::BAD_REQUEST,
            RestconfError::no_such_subscription().with_path(url),
        )
    }

    pub fn encoding_unsupported(url: &str) -> Failure {
        Failure::new(
            StatusCode::BAD_REQUEST,
            RestconfError::encoding_unsupported().with_path(url),
        )
    }

    /// Map a store error onto the taxonomy. Verb handlers override this
    /// where their contract differs (e.g. POST's conflict handling).
    pub fn from_store(error: &datastore::Error, url: &str) -> Failure {
        use datastore::Error;
        match error {
            Error::Empty | Error::KeyPathNotFound => Failure::not_found(url, error.to_string()),
            Error::DataExists => Failure::conflict(url, error.to_string()),
            Error::NotUnique | Error::Shape(_) => Failure::malformed(url, error.to_string()),
            Error::Io(_) | Error::Json(_) => Failure::internal(url, error.to_string()),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, restconf::YANG_DATA_JSON)],
            axum::Json(self.errors),
        )
            .into_response()
    }
}

/// The fallback handler behind every `/restconf/...` data and operations
/// URL: resolve the route, capture the body, consult the validator, then
/// dispatch.
pub async fn handle(State(app): State<Arc<App>>, request: axum::extract::Request) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let url_path = uri.path().to_string();

    if method == Method::OPTIONS {
        return options::respond(&app, &url_path);
    }

    // Lower-cased header names, first value each; first value of each query
    // parameter. Both are captured for the validator.
    let mut headers = BTreeMap::new();
    for (name, value) in request.headers() {
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .or_insert_with(|| value.to_str().unwrap_or_default().to_string());
    }
    let mut query_params = BTreeMap::new();
    if let Some(query) = uri.query() {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            query_params
                .entry(name.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }

    let Some(found) = app.spec.find_route(&method, &url_path) else {
        let allowed = options::allowed_methods(&app.spec, &url_path);
        if allowed.is_empty() {
            tracing::debug!(%method, url = %url_path, "route not found");
            return Failure::route_not_found(&url_path).into_response();
        }
        tracing::debug!(%method, url = %url_path, ?allowed, "method not in allowed set");
        return options::method_not_allowed(&url_path, &allowed);
    };

    let mut path_params = Vec::with_capacity(found.path_params.len());
    for (name, raw) in &found.path_params {
        match restconf::compile::percent_decode(raw) {
            Ok(decoded) => path_params.push((name.clone(), decoded)),
            Err(error) => {
                return Failure::malformed(
                    &url_path,
                    format!("invalid path parameter {name:?}: {error}"),
                )
                .into_response()
            }
        }
    }

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(bytes),
        Err(error) => {
            return Failure::malformed(&url_path, format!("failed to read request body: {error}"))
                .into_response()
        }
    };

    if let Some(validator) = &app.validator {
        let validation = crate::validator::ValidationRequest {
            path: found.route.template.clone(),
            method: method.as_str().to_string(),
            headers,
            path_params: path_params.iter().cloned().collect(),
            query_params,
            body: body
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        };
        match validator.validate(&validation).await {
            Err(error) => {
                tracing::error!(?error, "validation service unavailable");
                return Failure::internal(&url_path, "validation service unavailable")
                    .into_response();
            }
            Ok(verdict) if !verdict.ok => {
                tracing::info!(url = %url_path, message = %verdict.message, "request rejected by validator");
                return Failure::malformed(&url_path, verdict.message).into_response();
            }
            Ok(_) => {}
        }
    }

    let template = found.route.template.as_str();
    if template.ends_with(ESTABLISH_SUBSCRIPTION) {
        return operations::establish(&app, &url_path, body.as_deref());
    }
    if template.ends_with(DELETE_SUBSCRIPTION) {
        return operations::delete(&app, &url_path, body.as_deref());
    }

    data::dispatch(&app, &found, &method, &url_path, &path_params, body.as_deref())
}

/// `GET /restconf/streams/yang-push-json/subscription-id={id}`: attach an
/// SSE client to the subscription. The response streams until the peer
/// disconnects or the subscription is deleted.
pub async fn handle_stream(
    State(app): State<Arc<App>>,
    axum::extract::Path(tail): axum::extract::Path<String>,
) -> Response {
    let Some(id) = tail
        .strip_prefix("subscription-id=")
        .and_then(|id| id.parse::<u32>().ok())
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(connection) = app.center.connect(id) else {
        tracing::debug!(subscription = id, "stream requested for unknown subscription");
        return StatusCode::NOT_FOUND.into_response();
    };
    tracing::info!(subscription = id, client = %connection.client_id(), "sse client connected");

    use futures::StreamExt;
    let stream = connection.map(|payload| {
        Ok::<_, std::convert::Infallible>(
            axum::response::sse::Event::default().data(payload.as_ref()),
        )
    });

    axum::response::sse::Sse::new(stream)
        .keep_alive(
            axum::response::sse::KeepAlive::new()
                .interval(app.settings.heartbeat)
                .text(""),
        )
        .into_response()
}
