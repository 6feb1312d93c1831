//! Environment configuration for the worker and API binaries.
//!
//! Both configs are read through a lookup function so tests can supply a map
//! instead of touching the process environment. Unparseable values fall back
//! to defaults.

use crate::converter::{DEFAULT_CONVERTER_PATH, DEFAULT_CONVERTER_TIMEOUT};
use crate::queue::DEFAULT_QUEUE_KEY;
use crate::telemetry::LogFormat;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";
pub const DEFAULT_STATUS_NAMESPACE: &str = "FileConversionStatus";
pub const DEFAULT_BUCKET: &str = "file-conversion-bucket";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SERVICE_NAME: &str = "pdfconv-worker";

/// Settings shared by both services.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonConfig {
    pub redis_url: String,
    pub status_namespace: String,
    pub event_queue_key: String,
    pub aws_region: String,
    pub s3_endpoint_url: Option<String>,
    pub log_format: LogFormat,
    pub otel_endpoint: Option<String>,
    pub otel_service_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub common: CommonConfig,
    pub concurrency: usize,
    pub converter_path: PathBuf,
    pub converter_timeout: Duration,
    /// `None` when `JOB_TIMEOUT_SECS=0`.
    pub job_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub common: CommonConfig,
    pub bind_addr: String,
    pub bucket: String,
    pub max_upload_bytes: usize,
    pub publish_events: bool,
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}

impl CommonConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Self {
        Self {
            redis_url: env.get_or("REDIS_URL", DEFAULT_REDIS_URL),
            status_namespace: env.get_or("STATUS_NAMESPACE", DEFAULT_STATUS_NAMESPACE),
            event_queue_key: env.get_or("EVENT_QUEUE_KEY", DEFAULT_QUEUE_KEY),
            aws_region: env.get_or("AWS_REGION", DEFAULT_REGION),
            s3_endpoint_url: env.get("S3_ENDPOINT_URL"),
            log_format: LogFormat::parse(&env.get_or("LOG_FORMAT", "text")),
            otel_endpoint: env.get("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otel_service_name: env.get_or("OTEL_SERVICE_NAME", DEFAULT_SERVICE_NAME),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let env = Env { lookup };
        let job_timeout_secs: u64 = env.get_parsed("JOB_TIMEOUT_SECS", 300);

        Self {
            common: CommonConfig::from_env(&env),
            concurrency: env.get_parsed("WORKER_CONCURRENCY", 4usize).max(1),
            converter_path: PathBuf::from(env.get_or("DOCUMENT_CONVERTER_PATH", DEFAULT_CONVERTER_PATH)),
            converter_timeout: Duration::from_secs(env.get_parsed(
                "DOCUMENT_CONVERTER_TIMEOUT_SECS",
                DEFAULT_CONVERTER_TIMEOUT.as_secs(),
            )),
            job_timeout: (job_timeout_secs > 0).then(|| Duration::from_secs(job_timeout_secs)),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let env = Env { lookup };
        Self {
            common: CommonConfig::from_env(&env),
            bind_addr: env.get_or("API_BIND_ADDR", "0.0.0.0:8000"),
            bucket: env.get_or("S3_BUCKET", DEFAULT_BUCKET),
            max_upload_bytes: env.get_parsed("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            publish_events: env.get_bool("PUBLISH_UPLOAD_EVENTS", true),
        }
    }
}
