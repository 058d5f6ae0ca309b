//! A schema-driven RESTCONF mock server: an in-memory datastore generated
//! from an OpenAPI description, RESTCONF CRUD over it, and yang-push change
//! notifications delivered to SSE subscribers.

pub mod generate;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod sse;
pub mod subscriptions;
pub mod trigger;
pub mod validator;

use axum::routing::get;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Runtime knobs the request handlers read.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the datastore document is persisted.
    pub database_path: PathBuf,
    /// SSE heartbeat interval.
    pub heartbeat: Duration,
    /// Snapshot pair consumed by the trigger endpoint.
    pub snapshot_previous: PathBuf,
    pub snapshot_after: PathBuf,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            database_path: PathBuf::from("database.json"),
            heartbeat: Duration::from_secs(15),
            snapshot_previous: PathBuf::from(".temp/database_previous.json"),
            snapshot_after: PathBuf::from(".temp/database_after.json"),
        }
    }
}

/// The server's shared state: every component is constructed at startup and
/// passed in; none is a global.
pub struct App {
    pub spec: schema::Spec,
    pub generator: generate::DataGenerator,
    pub store: datastore::Store,
    pub center: subscriptions::SubscriptionCenter,
    pub validator: Option<Arc<dyn validator::Validator>>,
    pub settings: Settings,
}

/// Build the HTTP router: the trigger and stream endpoints, with everything
/// else falling through to the RESTCONF pipeline.
pub fn build_router(app: Arc<App>, cors_enabled: bool) -> axum::Router {
    let router = axum::Router::new()
        .route(
            "/internal/trigger",
            get(trigger::handle).post(trigger::handle),
        )
        .route(
            "/restconf/streams/yang-push-json/:subscription",
            get(pipeline::handle_stream),
        )
        .fallback(pipeline::handle)
        .with_state(app)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    if cors_enabled {
        router.layer(tower_http::cors::CorsLayer::permissive())
    } else {
        router
    }
}
