use std::path::PathBuf;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Per-task join timeout during graceful shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Externally visible base URL, used to build thumbnail links.
    pub public_base_url: String,
    /// Root directory for stored originals and thumbnails.
    pub upload_dir: PathBuf,
    /// Maximum accepted upload size in bytes (default: 10 MiB).
    pub max_upload_bytes: usize,
    /// Job queue connection string. The literal value `memory` selects the
    /// in-process queue instead of Redis.
    pub queue_url: String,
    /// Redis list key the pipeline drains.
    pub queue_name: String,
    /// Worker pool size. `None` falls back to the number of CPU cores.
    pub worker_count: Option<usize>,
    /// JWT token configuration (secret, expiry duration).
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `8080`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `PUBLIC_BASE_URL`      | `http://localhost:8080`    |
    /// | `UPLOAD_DIR`           | `uploads`                  |
    /// | `MAX_UPLOAD_BYTES`     | `10485760`                 |
    /// | `QUEUE_URL`            | `redis://127.0.0.1:6379`   |
    /// | `QUEUE_NAME`           | `darkroom:jobs`            |
    /// | `WORKER_COUNT`         | (number of CPU cores)      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        let upload_dir = PathBuf::from(std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()));

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "10485760".into())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let queue_url =
            std::env::var("QUEUE_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());

        let queue_name = std::env::var("QUEUE_NAME")
            .unwrap_or_else(|_| darkroom_queue::DEFAULT_QUEUE_KEY.into());

        let worker_count: Option<usize> = std::env::var("WORKER_COUNT")
            .ok()
            .map(|v| v.parse().expect("WORKER_COUNT must be a valid usize"));

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            public_base_url,
            upload_dir,
            max_upload_bytes,
            queue_url,
            queue_name,
            worker_count,
            jwt,
        }
    }
}
