use serde::Deserialize;
use std::time::Duration;

use crate::services::catalog::CatalogMode;
use crate::services::retry::RetryPolicy;
use crate::services::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// Workers AI text-to-image model identifier
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Jobs of a single batch allowed in `processing` at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Upstream calls admitted per rolling minute, shared by every batch in the process
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: usize,

    /// Wall-clock deadline for a single upstream call
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,

    /// Attempts per job before it settles into `failed`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; attempt `n` waits `n * retry_delay_ms`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on colors x angles x sizes
    #[serde(default = "default_max_batch_jobs")]
    pub max_batch_jobs: usize,

    /// Generate a reference headshot for the persona before running jobs
    #[serde(default = "default_persona_headshot")]
    pub persona_headshot: bool,

    /// Reject unknown product/style keys instead of falling back to defaults
    #[serde(default = "default_strict_catalog")]
    pub strict_catalog: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_image_model() -> String {
    "@cf/stabilityai/stable-diffusion-xl-base-1.0".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_rate_limit_per_minute() -> usize {
    10
}

fn default_job_timeout_ms() -> u64 {
    120_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_max_batch_jobs() -> usize {
    50
}

fn default_persona_headshot() -> bool {
    true
}

fn default_strict_catalog() -> bool {
    cfg!(debug_assertions)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_jobs: self.max_concurrent_jobs.max(1),
            job_timeout: Duration::from_millis(self.job_timeout_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn catalog_mode(&self) -> CatalogMode {
        if self.strict_catalog {
            CatalogMode::Strict
        } else {
            CatalogMode::Lenient
        }
    }
}
