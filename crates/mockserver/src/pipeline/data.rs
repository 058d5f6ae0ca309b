//! Per-verb dispatch of datastore CRUD requests.

use super::Failure;
use crate::schema::{self, RouteMatch};
use crate::App;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use datastore::path::Step;
use datastore::{Error as StoreError, Path};
use serde_json::Value;

pub fn dispatch(
    app: &App,
    found: &RouteMatch<'_>,
    method: &Method,
    url: &str,
    params: &[(String, String)],
    body: Option<&[u8]>,
) -> Response {
    let key_params = found.operation.key_leaf_params(found.route);
    let path = match restconf::compile(url, &key_params) {
        Ok(path) => path,
        Err(error) => {
            tracing::debug!(url, %error, "path compilation failed");
            return Failure::malformed(url, format!("cannot compile path: {error}"))
                .into_response();
        }
    };

    let response = match method.as_str() {
        "GET" => get(app, found, url, &path, false),
        "HEAD" => get(app, found, url, &path, true),
        "POST" => post(app, found, url, &path, body),
        "PUT" => put(app, found, url, &path, params, body),
        "PATCH" => patch(app, found, url, &path, params, body),
        "DELETE" => delete(app, url, &path),
        _ => Failure::method_not_allowed(url).into_response(),
    };

    // The document is persisted on the way out of every data request; a
    // failed write never affects the response already computed.
    if let Err(error) = app.store.save(&app.settings.database_path) {
        tracing::error!(?error, path = ?app.settings.database_path, "failed to persist datastore");
    }
    response
}

fn get(app: &App, found: &RouteMatch<'_>, url: &str, path: &Path, head_only: bool) -> Response {
    let (value, parent_is_array) = match app.store.get(path) {
        Ok(hit) => hit,
        Err(StoreError::Empty) => {
            return Failure::not_found(url, "Resource not found").into_response()
        }
        Err(error) => return Failure::from_store(&error, url).into_response(),
    };

    if head_only {
        let mut response =
            (StatusCode::OK, [(header::CONTENT_TYPE, restconf::YANG_DATA_JSON)]).into_response();
        metadata_headers(app, &mut response);
        return response;
    }

    // Overlay the stored value into the schema-generated envelope under its
    // namespaced top-level key, re-wrapped as a list when the value is a
    // list entry.
    let (top_key, mut envelope) = match app.generator.envelope(&app.spec, found.operation) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::error!(?error, url, "cannot build response envelope");
            return Failure::internal(url, "cannot build response envelope").into_response();
        }
    };
    let wrapped = if parent_is_array {
        Value::Array(vec![value])
    } else {
        value
    };
    if let Some(envelope) = envelope.as_object_mut() {
        envelope.insert(top_key, wrapped);
    }

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, restconf::YANG_DATA_JSON)],
        axum::Json(envelope),
    )
        .into_response();
    metadata_headers(app, &mut response);
    response
}

fn post(
    app: &App,
    found: &RouteMatch<'_>,
    url: &str,
    parent: &Path,
    body: Option<&[u8]>,
) -> Response {
    let (top_key, payload) = match single_key_body(url, body) {
        Ok(parsed) => parsed,
        Err(failure) => return failure.into_response(),
    };

    let child_key = strip_module_prefix(&top_key, url);
    let key_leaves = found
        .operation
        .request_body_schema(&app.spec)
        .and_then(|body_schema| schema::key_leaves_for(&app.spec, body_schema, &top_key))
        .unwrap_or_default();

    match app.store.post(parent, payload, &child_key, &key_leaves) {
        Ok(append_key) => {
            let location = format!("{}/{append_key}", url.trim_end_matches('/'));
            tracing::info!(%location, "resource created");

            let mut response = StatusCode::CREATED.into_response();
            if let Ok(value) = HeaderValue::from_str(&location) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            metadata_headers(app, &mut response);
            response
        }
        Err(error @ StoreError::DataExists) => {
            Failure::conflict(url, error.to_string()).into_response()
        }
        Err(StoreError::KeyPathNotFound) => {
            Failure::not_found(url, "parent resource not found").into_response()
        }
        Err(error) => Failure::malformed(url, error.to_string()).into_response(),
    }
}

fn put(
    app: &App,
    found: &RouteMatch<'_>,
    url: &str,
    path: &Path,
    params: &[(String, String)],
    body: Option<&[u8]>,
) -> Response {
    let (top_key, payload) = match single_key_body(url, body) {
        Ok(parsed) => parsed,
        Err(failure) => return failure.into_response(),
    };
    if let Err(failure) =
        key_leaf_immutability(app, found, "PUT", url, path, params, &payload, &top_key)
    {
        return failure.into_response();
    }

    match app.store.put(path, payload) {
        Ok(created) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::NO_CONTENT
            };
            let mut response = status.into_response();
            metadata_headers(app, &mut response);
            response
        }
        Err(error) => Failure::from_store(&error, url).into_response(),
    }
}

fn patch(
    app: &App,
    found: &RouteMatch<'_>,
    url: &str,
    path: &Path,
    params: &[(String, String)],
    body: Option<&[u8]>,
) -> Response {
    let (top_key, payload) = match single_key_body(url, body) {
        Ok(parsed) => parsed,
        Err(failure) => return failure.into_response(),
    };
    if let Err(failure) =
        key_leaf_immutability(app, found, "PATCH", url, path, params, &payload, &top_key)
    {
        return failure.into_response();
    }

    match app.store.patch(path, payload) {
        Ok(()) => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            metadata_headers(app, &mut response);
            response
        }
        Err(StoreError::KeyPathNotFound) => {
            Failure::not_found(url, "resource not found").into_response()
        }
        Err(error) => Failure::malformed(url, error.to_string()).into_response(),
    }
}

fn delete(app: &App, url: &str, path: &Path) -> Response {
    match app.store.delete(path) {
        Ok(()) => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            metadata_headers(app, &mut response);
            response
        }
        Err(StoreError::KeyPathNotFound) => {
            Failure::not_found(url, "resource not found").into_response()
        }
        Err(error) => Failure::malformed(url, error.to_string()).into_response(),
    }
}

/// Parse the body as an object with exactly one top-level (namespaced) key,
/// returning that key and its value.
fn single_key_body(url: &str, body: Option<&[u8]>) -> Result<(String, Value), Failure> {
    let Some(body) = body else {
        return Err(Failure::malformed(url, "request body is required"));
    };
    let value: Value = serde_json::from_slice(body)
        .map_err(|error| Failure::malformed(url, format!("malformed JSON body: {error}")))?;
    let Some(object) = value.as_object() else {
        return Err(Failure::malformed(url, "request body must be an object"));
    };
    if object.len() != 1 {
        return Err(Failure::malformed(
            url,
            "request body must contain exactly one top-level key",
        ));
    }
    let (top_key, payload) = object.iter().next().expect("length checked above");
    Ok((top_key.clone(), payload.clone()))
}

/// The RESTCONF child identifier for data attached below `url`: the body's
/// top-level key, with its module prefix stripped when the URL is already
/// inside that module's namespace.
fn strip_module_prefix(top_key: &str, url: &str) -> String {
    match top_key.split_once(':') {
        Some((module, rest)) if url.contains(&format!("{module}:")) => rest.to_string(),
        _ => top_key.to_string(),
    }
}

/// Reject a PUT or PATCH whose body would change any key leaf of the
/// targeted list entry. Each key leaf is compared against the tail of the
/// ordered path parameters (last-in, last-compared).
#[allow(clippy::too_many_arguments)]
fn key_leaf_immutability(
    app: &App,
    found: &RouteMatch<'_>,
    method: &str,
    url: &str,
    path: &Path,
    params: &[(String, String)],
    payload: &Value,
    top_key: &str,
) -> Result<(), Failure> {
    if !matches!(path.last(), Some(Step::Entry { .. })) {
        return Ok(());
    }
    let Some(body_schema) = found.operation.request_body_schema(&app.spec) else {
        return Ok(());
    };
    let Some(key_leaves) = schema::key_leaves_for(&app.spec, body_schema, top_key) else {
        return Ok(());
    };
    if key_leaves.is_empty() || params.len() < key_leaves.len() {
        return Ok(());
    }
    let Some(entry) = payload.as_array().and_then(|entries| entries.first()) else {
        return Ok(());
    };

    let tail = &params[params.len() - key_leaves.len()..];
    for (leaf, (_, expected)) in key_leaves.iter().zip(tail) {
        let actual = entry.get(leaf).map(leaf_string);
        if actual.as_deref() != Some(expected.as_str()) {
            return Err(Failure::malformed(
                url,
                format!(
                    "The {method} method MUST NOT be used to change the key leaf \
                     values for a data resource instance",
                ),
            ));
        }
    }
    Ok(())
}

fn leaf_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn metadata_headers(app: &App, response: &mut Response) {
    if let Some(last_modified) = app.store.last_modified() {
        if let Ok(value) = HeaderValue::from_str(&last_modified) {
            response.headers_mut().insert(header::LAST_MODIFIED, value);
        }
    }
    if let Some(etag) = app.store.etag() {
        if let Ok(value) = HeaderValue::from_str(&etag) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_strip_module_prefix() {
        // Same module as the URL: the prefix is dropped.
        assert_eq!(
            strip_module_prefix(
                "ietf-network:node",
                "/restconf/data/ietf-network:networks/network=n1/node",
            ),
            "node",
        );
        // A different module keeps its prefix.
        assert_eq!(
            strip_module_prefix(
                "ietf-network-topology:link",
                "/restconf/data/ietf-network:networks/network=n1",
            ),
            "ietf-network-topology:link",
        );
        // No module prefix at all.
        assert_eq!(strip_module_prefix("node", "/restconf/data/x"), "node");
    }

    #[test]
    fn test_leaf_string_forms() {
        assert_eq!(leaf_string(&serde_json::json!("nA")), "nA");
        assert_eq!(leaf_string(&serde_json::json!(42)), "42");
        assert_eq!(leaf_string(&serde_json::json!(true)), "true");
    }
}
