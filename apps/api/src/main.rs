mod chat;
mod config;
mod db;
mod documents;
mod easify;
mod errors;
mod generation;
mod llm_client;
mod messaging;
mod models;
mod routes;
mod secrets;
mod state;
mod storage;
mod users;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::documents::PgConnector;
use crate::generation::handlers::handle_course_message;
use crate::llm_client::OpenAiConnector;
use crate::messaging::RedisPublisher;
use crate::routes::build_router;
use crate::secrets::S3SecretStore;
use crate::state::AppState;
use crate::storage::S3ObjectStore;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kiln v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO: secrets, prompts and image assets
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let state = AppState {
        config: config.clone(),
        secrets: Arc::new(S3SecretStore::new(s3.clone())),
        objects: Arc::new(S3ObjectStore::new(
            s3,
            config.s3_bucket.clone(),
            &config.s3_public_url,
        )),
        publisher: Arc::new(RedisPublisher::new(redis.clone())),
        llm: Arc::new(OpenAiConnector::new(http, config.openai_api_url.as_str())),
        documents: Arc::new(PgConnector),
    };
    info!(
        "Image generation {}",
        if config.enable_image_generation { "enabled" } else { "disabled" }
    );

    // Course worker: each fan-out message is its own single-course batch
    let worker_state = state.clone();
    tokio::spawn(messaging::consume(
        redis,
        config.course_topic.clone(),
        move |payload| handle_course_message(worker_state.clone(), payload),
    ));

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "kiln-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
