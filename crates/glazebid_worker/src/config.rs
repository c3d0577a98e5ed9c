//! Worker configuration from environment variables.
//!
//! Every key is optional with a default, so a bare `glazebid-worker`
//! starts against a local stack. `DATABASE_URL` falls back to a SQLite
//! file next to the temp root.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Worker operating mode: `full` runs renders and main jobs,
/// `render_only` runs only the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    Full,
    RenderOnly,
}

impl WorkerMode {
    pub fn from_env_value(value: &str) -> Self {
        match value {
            "render_only" => WorkerMode::RenderOnly,
            _ => WorkerMode::Full,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    pub minio_endpoint: String,
    pub minio_port: u16,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_use_ssl: bool,

    pub poll_interval: Duration,
    pub worker_id: String,
    pub worker_mode: WorkerMode,

    pub temp_dir: PathBuf,
    pub disk_pressure_threshold_pct: f64,
    pub max_memory_mb: u64,

    pub thumb_dpi: u32,
    pub measure_dpi: u32,
    pub max_render_pixels: u32,
    pub max_render_dpi: u32,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let temp_dir = PathBuf::from(env_or("TEMP_DIR", "/data/worker-tmp"));
        let default_db = format!("sqlite:{}?mode=rwc", temp_dir.join("glazebid.db").display());
        Config {
            database_url: env_or("DATABASE_URL", &default_db),

            minio_endpoint: env_or("MINIO_ENDPOINT", "minio"),
            minio_port: env_parse("MINIO_PORT", 9000),
            minio_access_key: env_or("MINIO_ACCESS_KEY", "minioadmin"),
            minio_secret_key: env_or("MINIO_SECRET_KEY", "minioadmin_secret"),
            minio_use_ssl: env_or("MINIO_USE_SSL", "false").to_lowercase() == "true",

            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL_SECONDS", 2)),
            worker_id: env_or("WORKER_ID", "worker-1"),
            worker_mode: WorkerMode::from_env_value(&env_or("WORKER_MODE", "full")),

            temp_dir,
            disk_pressure_threshold_pct: env_parse("DISK_PRESSURE_THRESHOLD_PCT", 80.0),
            max_memory_mb: env_parse("MAX_MEMORY_MB", 5120),

            thumb_dpi: env_parse("PNG_THUMB_DPI", 72),
            measure_dpi: env_parse("PNG_MEASURE_DPI", 200),
            max_render_pixels: env_parse("MAX_RENDER_PIXELS", 8000),
            max_render_dpi: env_parse("MAX_RENDER_DPI", 400),
        }
    }

    /// Object store endpoint URL for the S3 client.
    pub fn minio_endpoint_url(&self) -> String {
        let scheme = if self.minio_use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.minio_endpoint, self.minio_port)
    }

    /// Scratch directory owned by a job while it holds the lock.
    pub fn job_temp_dir(&self, job_id: &str) -> PathBuf {
        self.temp_dir.join(job_id)
    }
}
