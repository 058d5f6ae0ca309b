//! OPTIONS handling and 405 probing: the router is probed with each verb to
//! learn which are allowed for a URL.

use super::Failure;
use crate::schema::Spec;
use crate::App;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

const PROBES: [Method; 6] = [
    Method::HEAD,
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// The probe methods the router resolves for `url`.
pub fn allowed_methods(spec: &Spec, url: &str) -> Vec<Method> {
    PROBES
        .iter()
        .filter(|method| spec.find_route(method, url).is_some())
        .cloned()
        .collect()
}

/// Answer an OPTIONS request: `Allow` lists the probed methods plus
/// OPTIONS, with `Accept-Patch` when PATCH is among them. A URL no verb
/// resolves is a 404.
pub fn respond(app: &App, url: &str) -> Response {
    let allowed = allowed_methods(&app.spec, url);
    if allowed.is_empty() {
        return Failure::route_not_found(url).into_response();
    }
    let accept_patch = allowed.contains(&Method::PATCH);

    let mut response = StatusCode::OK.into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, allow_header(&allowed));
    if accept_patch {
        response.headers_mut().insert(
            HeaderName::from_static("accept-patch"),
            HeaderValue::from_static(restconf::YANG_DATA_JSON),
        );
    }
    response
}

/// Answer a request whose verb is outside the allowed set of an otherwise
/// known URL.
pub fn method_not_allowed(url: &str, allowed: &[Method]) -> Response {
    let mut response = Failure::method_not_allowed(url).into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, allow_header(allowed));
    response
}

fn allow_header(allowed: &[Method]) -> HeaderValue {
    let mut names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
    names.push("OPTIONS");
    HeaderValue::from_str(&names.join(","))
        .expect("method names are valid header characters")
}
