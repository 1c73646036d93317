use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use crate::marks_table::{ExamPeriod, Semester};

pub const DEFAULT_BASE_URL: &str = "https://ems.vignanlara.org";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MIN_REQUEST_GAP_MS: u64 = 250;

pub const ENV_PREFIX: &str = "PORTAL_";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_min_request_gap_ms() -> u64 {
    DEFAULT_MIN_REQUEST_GAP_MS
}

/// The `PORTAL_*` env vars describing how to reach the portal.
#[derive(Debug, Deserialize)]
pub struct PortalEnv {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_min_request_gap_ms")]
    min_request_gap_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: Url,
    pub timeout: Duration,
    pub min_request_gap: Duration,
}

impl PortalConfig {
    pub fn new() -> anyhow::Result<Self> {
        let portal_env = PortalEnv::load_from_env()?;
        Self::try_from(portal_env)
    }

    /// Default timeouts against an arbitrary origin.
    pub fn for_base_url(base_url: &str) -> anyhow::Result<Self> {
        Self::try_from(PortalEnv {
            base_url: base_url.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_request_gap_ms: DEFAULT_MIN_REQUEST_GAP_MS,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_request_gap(mut self, min_request_gap: Duration) -> Self {
        self.min_request_gap = min_request_gap;
        self
    }
}

impl TryFrom<PortalEnv> for PortalConfig {
    type Error = anyhow::Error;

    fn try_from(portal_env: PortalEnv) -> anyhow::Result<Self> {
        let base_url = Url::parse(&portal_env.base_url)
            .with_context(|| format!("invalid portal base url: {}", portal_env.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!(
                "portal base url cannot carry paths: {}",
                base_url
            ));
        }
        Ok(Self {
            base_url,
            timeout: Duration::from_secs(portal_env.timeout_secs),
            min_request_gap: Duration::from_millis(portal_env.min_request_gap_ms),
        })
    }
}

fn default_selection() -> String {
    "1".to_string()
}

/// The extra `PORTAL_*` env vars read by the command line tool.
#[derive(Debug, Deserialize)]
pub struct CliEnv {
    pub username: String,
    pub password: String,
    #[serde(default = "default_selection")]
    semester: String,
    #[serde(default = "default_selection")]
    exam_period: String,
    pub cache_file: Option<PathBuf>,
    /// Skip the cache and always ask the portal.
    #[serde(default)]
    pub refresh: bool,
}

impl CliEnv {
    pub fn semester(&self) -> anyhow::Result<Semester> {
        self.semester.parse().context("invalid PORTAL_SEMESTER")
    }

    pub fn exam_period(&self) -> anyhow::Result<ExamPeriod> {
        self.exam_period.parse().context("invalid PORTAL_EXAM_PERIOD")
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config = envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
