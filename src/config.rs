//! Configuration management.
//!
//! Two layers:
//! - [`ApiConfig`]: Blockfrost credentials, rate limits and paths. Loaded from
//!   environment variables (with `.env` support) or a TOML settings file.
//! - [`RunConfig`]: one JSON document per run, selecting the seeds, the
//!   enrichment categories and the output shape.

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::ada::Ada;

/// API and environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Blockfrost project id, sent as the `project_id` header
    #[serde(default)]
    pub project_id: String,

    /// Base URL for the Blockfrost API (mainnet)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Configuration and output directory paths
    #[serde(default)]
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    /// Maximum retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (ms)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Timeout for a single HTTP call (s)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause between two page requests of a paginated endpoint (ms)
    #[serde(default = "default_page_cooldown_ms")]
    pub page_cooldown_ms: u64,

    /// Deadline for the whole run (s), unbounded when absent
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            page_cooldown_ms: default_page_cooldown_ms(),
            run_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_configuration_dir")]
    pub configuration_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            configuration_dir: default_configuration_dir(),
            output_dir: default_output_dir(),
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://cardano-mainnet.blockfrost.io/api/v0".to_string()
}

fn default_rps() -> u32 {
    10 // Blockfrost sustained rate
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_cooldown_ms() -> u64 {
    100
}

fn default_configuration_dir() -> PathBuf {
    PathBuf::from("configuration")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_min_utxo_lovelace() -> u64 {
    2_000_000
}

impl ApiConfig {
    pub const API_KEY_VAR: &'static str = "BLOCKFROST_API_KEY";
    pub const BASE_URL_VAR: &'static str = "BLOCKFROST_BASE_URL";

    /// Load configuration from environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let project_id = std::env::var(Self::API_KEY_VAR).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", Self::API_KEY_VAR)
        })?;

        Ok(Self {
            project_id,
            base_url: std::env::var(Self::BASE_URL_VAR).unwrap_or_else(|_| default_base_url()),
            rate_limits: RateLimitConfig::default(),
            paths: PathConfig::default(),
        })
    }

    /// Load from a TOML settings file with environment overrides
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = ::toml::from_str(&contents)?;

        // Environment variables override file settings
        if let Ok(key) = std::env::var(Self::API_KEY_VAR) {
            config.project_id = key;
        }
        if let Ok(url) = std::env::var(Self::BASE_URL_VAR) {
            config.base_url = url;
        }

        if config.project_id.is_empty() {
            anyhow::bail!(
                "no project id in {:?} and {} is not set",
                path,
                Self::API_KEY_VAR
            );
        }

        Ok(config)
    }

    /// Ensure the output directory for an entry point exists
    pub fn ensure_output_dir(&self, entry: &str) -> anyhow::Result<PathBuf> {
        let dir = self.paths.output_dir.join(entry);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

// ============================================================================
// Run configuration
// ============================================================================

/// Enrichment steps an asset run can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    All,
    Details,
    Asset,
    Mint,
    MintAddresses,
    CurrentHolder,
    StakeAddresses,
}

/// The `data` key: either `"all"` or a list of categories
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "DataKey")]
pub struct DataSelection {
    categories: BTreeSet<Category>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DataKey {
    Single(Category),
    List(Vec<Category>),
}

impl TryFrom<DataKey> for DataSelection {
    type Error = String;

    fn try_from(key: DataKey) -> Result<Self, Self::Error> {
        let categories: BTreeSet<Category> = match key {
            DataKey::Single(Category::All) => [Category::All].into_iter().collect(),
            DataKey::Single(other) => {
                return Err(format!(
                    "data must be \"all\" or a list of categories, got {:?}",
                    other
                ))
            }
            DataKey::List(list) => list.into_iter().collect(),
        };
        Ok(Self { categories })
    }
}

impl Default for DataSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl DataSelection {
    pub fn all() -> Self {
        Self {
            categories: [Category::All].into_iter().collect(),
        }
    }

    pub fn only(categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
        }
    }

    /// Whether a category was requested, directly or through `all`
    pub fn includes(&self, category: Category) -> bool {
        self.categories.contains(&category) || self.categories.contains(&Category::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Projection of every record onto a single field before export
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Flatten<F> {
    pub key: F,
    pub label: String,
}

/// A flatten key, checked against the rest of its run configuration
pub trait FlattenKey {
    /// Reject keys projecting a column the run never fills
    fn check(&self, _metadata: &[String]) -> Result<(), String> {
        Ok(())
    }
}

/// One run of an entry point, as read from `<dir>/<entry>/<name>.json`.
///
/// `F` is the field selector of the records the entry point produces, so an
/// unknown `flatten.key` is rejected while loading.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig<F> {
    #[serde(default)]
    pub policy_id: Option<String>,

    /// Explicit asset ids; when non-empty the policy is not expanded
    #[serde(default)]
    pub assets: Vec<String>,

    #[serde(default)]
    pub addresses: Vec<String>,

    /// Cap on the number of exported records
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub data: DataSelection,

    /// On-chain metadata fields copied onto the record as `metadata<Field>`
    #[serde(default)]
    pub metadata: Vec<String>,

    #[serde(default)]
    pub format: OutputFormat,

    pub flatten: Option<Flatten<F>>,

    /// Minimum UTXO sent along with a sold NFT
    #[serde(default = "default_min_utxo_lovelace")]
    pub min_utxo_lovelace: u64,
}

impl<F: DeserializeOwned + FlattenKey> RunConfig<F> {
    /// Load `<configuration_dir>/<entry>/<name>.json`
    pub fn load(configuration_dir: &Path, entry: &str, name: &str) -> anyhow::Result<Self> {
        let path = configuration_dir.join(entry).join(format!("{}.json", name));
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run configuration {:?}", path))?;
        Self::from_json(&contents).with_context(|| format!("Invalid run configuration {:?}", path))
    }

    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

impl<F: FlattenKey> RunConfig<F> {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.limit == Some(0) {
            anyhow::bail!("limit must be > 0");
        }
        if let Some(flatten) = &self.flatten {
            if flatten.label.trim().is_empty() {
                anyhow::bail!("flatten.label must not be empty");
            }
            flatten.key.check(&self.metadata).map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }
}

impl<F> RunConfig<F> {
    pub fn min_utxo(&self) -> Ada {
        Ada::from_lovelace(self.min_utxo_lovelace)
    }

    /// Asset ids given explicitly, truncated to the limit
    pub fn explicit_assets(&self) -> Vec<String> {
        let take = self.limit.unwrap_or(self.assets.len());
        self.assets.iter().take(take).cloned().collect()
    }
}
