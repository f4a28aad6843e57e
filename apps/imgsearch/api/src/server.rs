use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use core_config::tracing::init_tracing;
use database::postgres::{self, DatabaseConnection};
use domain_images::{
    Collaborators, ErrorResponse, ImageService, LocalImageStorage, PgEmbeddingStore,
    PgImageRepository, PgSearchHistoryRepository, StorageConfig, embedding,
    handlers::{self, ApiDoc},
};
use eyre::{Result, WrapErr, bail};
use migration::Migrator;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, error, info, warn};
use utoipa::OpenApi;

use crate::config::Config;

const APP_NAME: &str = "imgsearch_api";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Load configuration, prepare storage and the index, then serve until a
/// shutdown signal arrives.
pub async fn run() -> Result<()> {
    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    init_tracing(&config.environment);

    info!(
        address = %config.server.address(),
        embedder = ?config.embedder.kind,
        upload_dir = %config.storage.upload_dir.display(),
        "Starting image search API"
    );

    let db = postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    postgres::check_health(&db)
        .await
        .wrap_err("PostgreSQL health check failed")?;
    postgres::run_migrations::<Migrator>(&db, APP_NAME)
        .await
        .wrap_err("Failed to run database migrations")?;

    let storage = LocalImageStorage::new(&config.storage.upload_dir)
        .await
        .wrap_err("Failed to prepare upload directory")?;
    let embedder = embedding::from_config(&config.embedder).wrap_err("Failed to create embedder")?;

    let deps = Collaborators {
        embedder,
        images: Arc::new(PgImageRepository::new(db.clone())),
        embeddings: Arc::new(PgEmbeddingStore::new(db.clone())),
        history: Arc::new(PgSearchHistoryRepository::new(db.clone())),
        storage: Arc::new(storage),
    };
    let service = Arc::new(ImageService::new(
        deps,
        config.storage.clone(),
        config.search.clone(),
    ));

    // Requests are only accepted once the startup build has completed
    let status = service
        .initialize_index()
        .await
        .wrap_err("Failed to build the vector index")?;
    info!(
        state = ?status.state,
        vectors = status.vectors,
        dimension = ?status.dimension,
        "Vector index built"
    );

    let app = build_router(service, &config.storage, &config.cors_origins)?;
    serve(app, &config.server.address(), db).await
}

/// Domain routes plus the OpenAPI document, static uploads, tracing and CORS.
pub fn build_router(
    service: Arc<ImageService>,
    storage: &StorageConfig,
    cors_origins: &[String],
) -> Result<Router> {
    if cors_origins.is_empty() {
        bail!("CORS_ALLOWED_ORIGIN must list at least one origin");
    }
    let origins = cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .wrap_err_with(|| format!("Invalid CORS origin '{}'", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    Ok(Router::new()
        .merge(handlers::router(service))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest_service("/uploads", ServeDir::new(&storage.upload_dir))
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            code: 404,
            error: "NOT_FOUND".to_string(),
            message: "Route not found".to_string(),
        }),
    )
}

async fn serve(app: Router, address: &str, db: DatabaseConnection) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", address))?;
    info!("Server listening on {}", address);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server error")?;

    info!("Server stopped, closing database connections");
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, db.close()).await {
        Ok(Ok(())) => info!("Database connections closed"),
        Ok(Err(e)) => warn!(error = %e, "Failed to close database connections"),
        Err(_) => warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Timed out closing database connections"
        ),
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
