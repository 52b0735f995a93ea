use std::time::Duration;

/// Startup configuration, loaded once from the environment in `main`.
///
/// Follows this codebase's existing pattern of `dotenvy::dotenv().ok()` followed
/// by `std::env::var` lookups with `.expect(...)` for anything the service cannot
/// run without.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,

    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
    pub gmail_pubsub_topic: String,
    pub gmail_api_base: String,
    pub gmail_token_endpoint: String,
    pub gmail_webhook_shared_secret: Option<String>,

    pub token_encryption_key: [u8; 32],
    pub auth_jwt_secret: String,

    pub worker_id_prefix: String,
    pub max_concurrent_jobs: usize,
    pub lock_timeout: Duration,
    pub worker_heartbeat_timeout: Duration,
    pub worker_retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "4000".into())
            .parse()?;

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let google_client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("GOOGLE_CLIENT_ID must be set"))?;
        let google_client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| anyhow::anyhow!("GOOGLE_CLIENT_SECRET must be set"))?;
        let google_redirect_uri = std::env::var("GOOGLE_REDIRECT_URI")
            .map_err(|_| anyhow::anyhow!("GOOGLE_REDIRECT_URI must be set"))?;
        let gmail_pubsub_topic = std::env::var("GMAIL_PUBSUB_TOPIC")
            .map_err(|_| anyhow::anyhow!("GMAIL_PUBSUB_TOPIC must be set"))?;
        let gmail_api_base = std::env::var("GMAIL_API_BASE")
            .unwrap_or_else(|_| "https://gmail.googleapis.com/gmail/v1/users".to_string());
        let gmail_token_endpoint = std::env::var("GMAIL_TOKEN_ENDPOINT")
            .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string());
        let gmail_webhook_shared_secret = std::env::var("GMAIL_WEBHOOK_SHARED_SECRET").ok();

        let token_encryption_key_b64 = std::env::var("TOKEN_ENCRYPTION_KEY")
            .map_err(|_| anyhow::anyhow!("TOKEN_ENCRYPTION_KEY must be set"))?;
        let token_encryption_key = decode_encryption_key(&token_encryption_key_b64)?;

        let auth_jwt_secret = std::env::var("AUTH_JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("AUTH_JWT_SECRET must be set"))?;

        let worker_id_prefix = std::env::var("WORKER_ID_PREFIX").unwrap_or_else(|_| {
            hostname_fallback()
        });
        let max_concurrent_jobs: usize = std::env::var("MAX_CONCURRENT_JOBS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .unwrap_or(1);
        let lock_timeout_secs: u64 = std::env::var("LOCK_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .unwrap_or(600);
        let heartbeat_timeout_secs: u64 = std::env::var("WORKER_HEARTBEAT_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .unwrap_or(300);
        let retry_delay_secs: u64 = std::env::var("WORKER_RETRY_DELAY_SECONDS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .unwrap_or(60);

        Ok(Self {
            port,
            database_url,
            google_client_id,
            google_client_secret,
            google_redirect_uri,
            gmail_pubsub_topic,
            gmail_api_base,
            gmail_token_endpoint,
            gmail_webhook_shared_secret,
            token_encryption_key,
            auth_jwt_secret,
            worker_id_prefix,
            max_concurrent_jobs,
            lock_timeout: Duration::from_secs(lock_timeout_secs),
            worker_heartbeat_timeout: Duration::from_secs(heartbeat_timeout_secs),
            worker_retry_delay: Duration::from_secs(retry_delay_secs),
        })
    }
}

fn decode_encryption_key(b64: &str) -> anyhow::Result<[u8; 32]> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| anyhow::anyhow!("TOKEN_ENCRYPTION_KEY is not valid base64: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("TOKEN_ENCRYPTION_KEY must decode to exactly 32 bytes"))
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string())
}
