//! Cardano NFT and address data export
//!
//! Collects data about Cardano native assets and address payments from the
//! Blockfrost API and exports it as JSON or CSV.
//!
//! # Entry points
//!
//! 1. **Assets** ([`fetch_assets`]): expands a policy (or an explicit asset
//!    list) and enriches each asset with details, its CIP-25 label, the mint
//!    transaction and its economics ([`mint`]), the current holder and the
//!    stake addresses involved
//! 2. **Transactions** ([`fetch_transactions`]): collects the payments
//!    received by a list of addresses
//!
//! Both read a run configuration from
//! `<configuration_dir>/<entry>/<name>.json` and write
//! `<output_dir>/<entry>/<name>.<json|csv>` through [`export`].
//!
//! # Example
//!
//! ```no_run
//! use cardano_asset_export::blockfrost::BlockfrostClient;
//! use cardano_asset_export::config::{ApiConfig, RunConfig};
//! use cardano_asset_export::fetch_assets::collect_assets;
//! use cardano_asset_export::pagination::PagedFetcher;
//! use cardano_asset_export::schemas::AssetField;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ApiConfig::load()?;
//!     let client = BlockfrostClient::new(&config)?;
//!     let run = RunConfig::<AssetField>::load(&config.paths.configuration_dir, "assets", "spacebudz")?;
//!     let (records, summary) = collect_assets(&client, &PagedFetcher::default(), &run).await?;
//!     println!("Enriched {} assets, {} failures", records.len(), summary.failures.len());
//!     Ok(())
//! }
//! ```

pub mod ada;
pub mod blockfrost;
pub mod config;
pub mod export;
pub mod fetch_assets;
pub mod fetch_transactions;
pub mod mint;
pub mod pagination;
pub mod schemas;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use ada::Ada;
pub use blockfrost::{ApiError, BlockfrostClient, ChainApi};
pub use config::{ApiConfig, RunConfig};
pub use schemas::{AddressTransactionRecord, AssetRecord, RunSummary};
