use anyhow::Context;
use clap::Parser;
use futures::FutureExt;
use mockserver::generate::{DataGenerator, Options, UseExamples};
use mockserver::validator::{HttpValidator, Validator};
use mockserver::{build_router, logging, schema, subscriptions, App, Settings};
use std::sync::Arc;

/// A schema-driven RESTCONF mock server: simulates a network-element
/// datastore described by an OpenAPI document, with yang-push change
/// notifications over server-sent events.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// URL or file path of the OpenAPI specification to mock.
    #[arg(long, env = "SPECIFICATION_URL")]
    specification_url: String,

    /// The HTTP port to listen on.
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// The HTTPS port to listen on; requires server.crt and server.key in
    /// the working directory. HTTPS is disabled when unset.
    #[arg(long, env = "HTTPS_PORT")]
    https_port: Option<u16>,

    /// Wrap the handler with permissive CORS middleware.
    #[arg(long, env = "CORS_ENABLED")]
    cors_enabled: bool,

    /// Where the datastore document is persisted.
    #[arg(long, env = "DATABASE_PATH", default_value = "database.json")]
    database_path: std::path::PathBuf,

    /// Port of the external validation service on localhost. Validation is
    /// skipped when unset.
    #[arg(long, env = "VALIDATOR_PORT")]
    validator_port: Option<u16>,

    /// Seconds between SSE heartbeats.
    #[arg(long, env = "SSE_INTERVAL", default_value = "15")]
    sse_interval: u64,

    /// Regenerate the datastore from the specification before serving.
    #[arg(long)]
    init_database: bool,

    #[command(flatten)]
    generation: GenerationArgs,

    #[command(flatten)]
    logging: logging::LogArgs,
}

/// Knobs for the data generator.
#[derive(Debug, clap::Args)]
struct GenerationArgs {
    #[arg(long, value_enum, default_value_t = UseExamples::No)]
    use_examples: UseExamples,
    /// Probability of generating null for nullable locations.
    #[arg(long, default_value_t = 0.0)]
    null_probability: f64,
    #[arg(long, default_value_t = 0)]
    default_min_int: i64,
    #[arg(long, default_value_t = i32::MAX as i64)]
    default_max_int: i64,
    #[arg(long, default_value_t = -(i32::MAX as f64) / 2.0, allow_hyphen_values = true)]
    default_min_float: f64,
    #[arg(long, default_value_t = (i32::MAX as f64) / 2.0)]
    default_max_float: f64,
    /// Generate null instead of failing on unsupported schemas.
    #[arg(long)]
    suppress_errors: bool,
}

impl GenerationArgs {
    fn options(&self) -> Options {
        Options {
            use_examples: self.use_examples,
            null_probability: self.null_probability,
            default_min_int: self.default_min_int,
            default_max_int: self.default_max_int,
            default_min_float: self.default_min_float,
            default_max_float: self.default_max_float,
            suppress_errors: self.suppress_errors,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.logging);
    tracing::debug!(?args, "parsed arguments");

    let spec = schema::loader::load(&args.specification_url)
        .await
        .context("loading OpenAPI specification")?;
    tracing::info!(
        specification = %args.specification_url,
        routes = spec.routes().len(),
        "specification loaded",
    );

    let generator = DataGenerator::new(args.generation.options());
    if args.init_database {
        let document = generator
            .initial_document(&spec)
            .context("generating initial datastore")?;
        datastore::Store::with_document(document)?
            .save(&args.database_path)
            .context("saving initial datastore")?;
        tracing::info!(path = ?args.database_path, "datastore initialized from specification");
    }

    let store = datastore::Store::load(&args.database_path).context("loading datastore")?;
    let center = subscriptions::SubscriptionCenter::load("subscriptions.json".into())
        .context("loading subscription table")?;
    let validator = args
        .validator_port
        .map(|port| Arc::new(HttpValidator::new(port)) as Arc<dyn Validator>);

    let settings = Settings {
        database_path: args.database_path.clone(),
        heartbeat: std::time::Duration::from_secs(args.sse_interval),
        ..Settings::default()
    };
    let app = Arc::new(App {
        spec,
        generator,
        store,
        center,
        validator,
        settings,
    });
    let router = build_router(app.clone(), args.cors_enabled);

    // Share-able future which completes when the server should exit.
    let shutdown = shutdown_signal().shared();

    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", args.port))
        .await
        .context("failed to bind HTTP port")?;
    tracing::info!(port = args.port, "starting HTTP server");
    let http = axum::serve(listener, router.clone()).with_graceful_shutdown(shutdown.clone());
    let http = async move { anyhow::Ok(http.await?) };

    let https = if let Some(https_port) = args.https_port {
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file("server.crt", "server.key")
            .await
            .context("failed to load server.crt / server.key")?;

        let handle = axum_server::Handle::new();
        tokio::spawn({
            let handle = handle.clone();
            let shutdown = shutdown.clone();
            async move {
                shutdown.await;
                handle.graceful_shutdown(Some(std::time::Duration::from_secs(30)));
            }
        });

        tracing::info!(port = https_port, "starting HTTPS server");
        let server = axum_server::bind_rustls(
            format!("[::]:{https_port}")
                .parse()
                .context("invalid HTTPS bind address")?,
            tls,
        )
        .handle(handle)
        .serve(router.into_make_service());
        async move { anyhow::Ok(server.await?) }.boxed()
    } else {
        futures::future::ready(anyhow::Ok(())).boxed()
    };

    let ((), ()) = tokio::try_join!(http, https)?;

    // The single snapshot taken on graceful shutdown.
    if let Err(error) = app.store.save(&args.database_path) {
        tracing::error!(?error, "failed to save datastore snapshot on shutdown");
    }
    tracing::info!("server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
