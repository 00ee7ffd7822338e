use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
///
/// Secrets and prompt templates are NOT read from the environment: only the
/// coordinates of the JSON objects that hold them. See `secrets`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Container holding the completion API key (`gptSecret`).
    pub secrets_bucket: String,
    pub secrets_key: String,
    /// Key (inside `secrets_bucket`) of the document-store credential blob.
    pub document_credential_key: String,
    /// Container holding the prompt templates.
    pub prompts_bucket: String,
    pub prompts_key: String,
    /// Bucket for generated image assets.
    pub s3_bucket: String,
    pub s3_endpoint: String,
    /// Base used to build public asset URLs. Defaults to `s3_endpoint`.
    pub s3_public_url: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub redis_url: String,
    /// Topic the course fan-out publishes to and the course worker consumes.
    pub course_topic: String,
    pub enable_image_generation: bool,
    pub openai_api_url: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let s3_endpoint = require_env("S3_ENDPOINT")?;

        Ok(Config {
            secrets_bucket: require_env("SECRETS_BUCKET")?,
            secrets_key: require_env("SECRETS_KEY")?,
            document_credential_key: require_env("DOCUMENT_STORE_CREDENTIAL_KEY")?,
            prompts_bucket: require_env("PROMPTS_BUCKET")?,
            prompts_key: require_env("PROMPTS_KEY")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_public_url: std::env::var("S3_PUBLIC_URL").unwrap_or_else(|_| s3_endpoint.clone()),
            s3_endpoint,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            redis_url: require_env("REDIS_URL")?,
            course_topic: std::env::var("COURSE_TOPIC")
                .unwrap_or_else(|_| "course-generation".to_string()),
            enable_image_generation: parse_flag(std::env::var("ENABLE_IMAGE_GEN").ok().as_deref())
                .context("ENABLE_IMAGE_GEN must be 'true' or 'false'")?,
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Image generation is on unless explicitly disabled.
fn parse_flag(value: Option<&str>) -> Result<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(true),
        Some(v) if v.is_empty() || v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => anyhow::bail!("unrecognised flag value '{v}'"),
    }
}
