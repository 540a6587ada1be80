//! Asset collection and enrichment.
//!
//! Expands a policy (or an explicit list) into asset ids, then enriches each
//! asset step by step. A step that fails is recorded and skipped; the other
//! steps and the other assets still run.

use crate::ada::Ada;
use crate::blockfrost::{ApiError, AssetAddress, ChainApi, TxMetadataEntry};
use crate::config::{Category, DataSelection, RunConfig};
use crate::mint::{MintClassifier, MintType};
use crate::pagination::PagedFetcher;
use crate::schemas::{AssetField, AssetRecord, Failure, RunSummary};
use chrono::DateTime;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// CIP-25 NFT metadata label
pub const NFT_METADATA_LABEL: &str = "721";

static NON_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\D").expect("Invalid regex pattern"));

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("No assets or policy_id configured")]
    NoSeeds,
}

/// Steps to run for every asset, resolved from the configured categories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentPlan {
    pub details: bool,
    pub label: bool,
    pub mint: bool,
    pub mint_addresses: bool,
    pub current_holder: bool,
    pub stake_addresses: bool,
    /// On-chain metadata fields to project onto the record
    pub metadata: Vec<String>,
}

impl EnrichmentPlan {
    pub fn from_selection(data: &DataSelection, metadata: Vec<String>) -> Self {
        let label = data.includes(Category::Asset);
        let mint_addresses = data.includes(Category::MintAddresses);
        // Fees feed the sale price
        let mint = data.includes(Category::Mint) || mint_addresses;
        let details = data.includes(Category::Details) || label || mint;

        Self {
            details,
            label,
            mint,
            mint_addresses,
            current_holder: data.includes(Category::CurrentHolder),
            stake_addresses: data.includes(Category::StakeAddresses),
            metadata,
        }
    }
}

/// An enriched asset and the steps that failed for it
#[derive(Debug)]
pub struct Enrichment {
    pub record: AssetRecord,
    pub failures: Vec<Failure>,
}

/// Keep a successful lookup; record any failure other than "not found".
fn settle<T>(
    item: &str,
    step: &str,
    failures: &mut Vec<Failure>,
    result: Result<T, ApiError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_not_found() => {
            debug!("{}: no {} data", item, step);
            None
        }
        Err(e) => {
            warn!("{}: {} lookup failed: {}", item, step, e);
            failures.push(Failure::new(item, step, &e));
            None
        }
    }
}

/// Label of an asset as keyed in its mint transaction's NFT metadata
pub fn asset_label(entries: &[TxMetadataEntry], policy_id: &str) -> Option<String> {
    entries
        .iter()
        .find(|e| e.label == NFT_METADATA_LABEL)
        .and_then(|e| e.json_metadata.get(policy_id))
        .and_then(|policy| policy.as_object())
        .and_then(|assets| assets.keys().next().cloned())
}

/// Digits of an asset label (`"SpaceBud #1234"` -> `"1234"`)
pub fn asset_number(label: &str) -> Option<String> {
    let digits = NON_DIGITS.replace_all(label, "");
    (!digits.is_empty()).then(|| digits.into_owned())
}

/// Address holding the largest quantity, first one on ties
pub fn largest_holder(holders: &[AssetAddress]) -> Option<&AssetAddress> {
    let mut best: Option<(&AssetAddress, u128)> = None;
    for holder in holders {
        let quantity = holder.quantity.parse::<u128>().unwrap_or(0);
        match best {
            Some((_, top)) if quantity <= top => {}
            _ => best = Some((holder, quantity)),
        }
    }
    best.map(|(holder, _)| holder)
}

pub struct AssetEnricher<'a, A> {
    api: &'a A,
    classifier: MintClassifier,
}

impl<'a, A: ChainApi> AssetEnricher<'a, A> {
    pub fn new(api: &'a A, classifier: MintClassifier) -> Self {
        Self { api, classifier }
    }

    pub async fn enrich(&self, asset_id: &str, plan: &EnrichmentPlan) -> Enrichment {
        let mut record = AssetRecord::new(asset_id);
        let mut failures = Vec::new();

        if plan.details {
            self.apply_details(&mut record, plan, &mut failures).await;
        }
        if plan.label {
            self.apply_label(&mut record, &mut failures).await;
        }
        if plan.mint {
            self.apply_mint(&mut record, &mut failures).await;
        }
        if plan.mint_addresses {
            self.apply_mint_addresses(&mut record, &mut failures).await;
        }
        if plan.current_holder {
            self.apply_current_holder(&mut record, &mut failures).await;
        }
        if plan.stake_addresses {
            self.apply_stake_addresses(&mut record, &mut failures).await;
        }

        Enrichment { record, failures }
    }

    async fn apply_details(
        &self,
        record: &mut AssetRecord,
        plan: &EnrichmentPlan,
        failures: &mut Vec<Failure>,
    ) {
        let id = record.asset.clone();
        let Some(details) = settle(&id, "details", failures, self.api.asset(&id).await) else {
            return;
        };

        record.asset = details.asset;
        record.policy_id = Some(details.policy_id);
        record.asset_name = details.asset_name;
        record.fingerprint = Some(details.fingerprint);
        record.mint_transaction_hash = details.initial_mint_tx_hash;

        if let Some(onchain) = &details.onchain_metadata {
            for field in &plan.metadata {
                if let Some(value) = onchain.get(field) {
                    record
                        .metadata_fields
                        .insert(AssetRecord::metadata_column(field), value.clone());
                }
            }
        }
        record.metadata = details.onchain_metadata;
    }

    async fn apply_label(&self, record: &mut AssetRecord, failures: &mut Vec<Failure>) {
        let (Some(hash), Some(policy_id)) = (&record.mint_transaction_hash, &record.policy_id)
        else {
            debug!("{}: no mint transaction or policy, skipping label", record.asset);
            return;
        };

        let result = self.api.tx_metadata(hash).await;
        let Some(entries) = settle(&record.asset, "asset", failures, result) else {
            return;
        };

        if let Some(label) = asset_label(&entries, policy_id) {
            record.asset_number = asset_number(&label);
            record.asset_label = Some(label);
        }
    }

    async fn apply_mint(&self, record: &mut AssetRecord, failures: &mut Vec<Failure>) {
        let Some(hash) = &record.mint_transaction_hash else {
            return;
        };

        let result = self.api.tx(hash).await;
        let Some(tx) = settle(&record.asset, "mint", failures, result) else {
            return;
        };

        record.mint_transaction_block = Some(tx.block_height);
        record.mint_transaction_slot = Some(tx.slot);
        record.mint_transaction_time = DateTime::from_timestamp(tx.block_time, 0);
        record.mint_transaction_utxo_count = Some(tx.utxo_count);
        match tx.fee() {
            Ok(fee) => record.mint_transaction_fees = Some(fee),
            Err(e) => failures.push(Failure::new(&record.asset, "mint", e)),
        }
    }

    async fn apply_mint_addresses(&self, record: &mut AssetRecord, failures: &mut Vec<Failure>) {
        let Some(hash) = &record.mint_transaction_hash else {
            return;
        };

        let result = self.api.tx_utxos(hash).await;
        let Some(utxos) = settle(&record.asset, "mint_addresses", failures, result) else {
            return;
        };

        let fees = record.mint_transaction_fees;
        let fields = match self.classifier.classify_utxos(
            &utxos.inputs,
            &utxos.outputs,
            fees.unwrap_or(Ada::ZERO),
        ) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("{}: {}", record.asset, e);
                failures.push(Failure::new(&record.asset, "mint_addresses", e));
                return;
            }
        };

        let kind = fields.kind;
        record.apply_mint_fields(fields);

        if kind == MintType::Mint && fees.is_none() {
            record.mint_transaction_price = None;
            failures.push(Failure::new(
                &record.asset,
                "mint_addresses",
                "price unavailable: mint transaction fees unknown",
            ));
        }
    }

    async fn apply_current_holder(&self, record: &mut AssetRecord, failures: &mut Vec<Failure>) {
        let result = self.api.asset_addresses(&record.asset).await;
        let Some(holders) = settle(&record.asset, "current_holder", failures, result) else {
            return;
        };

        if holders.len() > 1 {
            debug!("{}: {} holders, keeping the largest", record.asset, holders.len());
        }
        if let Some(holder) = largest_holder(&holders) {
            record.current_holder_address = Some(holder.address.clone());
        }
    }

    async fn apply_stake_addresses(&self, record: &mut AssetRecord, failures: &mut Vec<Failure>) {
        if let Some(address) = record.mint_transaction_address.clone() {
            let result = self.api.address(&address).await;
            if let Some(content) = settle(&record.asset, "stake_addresses", failures, result) {
                if content.stake_address.is_some() {
                    record.mint_transaction_stake_address = content.stake_address;
                }
            }
        }

        if let Some(address) = record.current_holder_address.clone() {
            let result = self.api.address(&address).await;
            if let Some(content) = settle(&record.asset, "stake_addresses", failures, result) {
                if content.stake_address.is_some() {
                    record.current_holder_stake_address = content.stake_address;
                }
            }
        }
    }
}

/// Resolve the asset ids of a run: the explicit list, or the policy's assets
async fn seed_assets<A: ChainApi>(
    api: &A,
    fetcher: &PagedFetcher,
    config: &RunConfig<AssetField>,
    summary: &mut RunSummary,
) -> Result<Vec<String>, AssetError> {
    if !config.assets.is_empty() {
        return Ok(config.explicit_assets());
    }

    let policy_id = config.policy_id.as_deref().ok_or(AssetError::NoSeeds)?;
    info!("processing policy {}", policy_id);

    let paged = fetcher
        .fetch(|page| api.policy_assets(policy_id, page), config.limit)
        .await;
    if let Some(e) = &paged.error {
        summary
            .failures
            .push(Failure::new(policy_id, "policy_assets", e));
    }

    Ok(paged.items.into_iter().map(|a| a.asset).collect())
}

/// Run the asset entry point: seed, enrich every asset, stop at the limit
pub async fn collect_assets<A: ChainApi>(
    api: &A,
    fetcher: &PagedFetcher,
    config: &RunConfig<AssetField>,
) -> Result<(Vec<AssetRecord>, RunSummary), AssetError> {
    let mut summary = RunSummary::default();

    let asset_ids = seed_assets(api, fetcher, config, &mut summary).await?;
    summary.found = asset_ids.len();
    info!("found {} assets", summary.found);

    let plan = EnrichmentPlan::from_selection(&config.data, config.metadata.clone());
    let enricher = AssetEnricher::new(api, MintClassifier::new(config.min_utxo()));

    let mut records = Vec::with_capacity(asset_ids.len());
    for asset_id in &asset_ids {
        info!("processing {} {}", summary.processed + 1, asset_id);

        let Enrichment { record, failures } = enricher.enrich(asset_id, &plan).await;
        summary.record_failures(failures);
        summary.processed += 1;
        records.push(record);

        if config.limit.is_some_and(|l| records.len() >= l) {
            info!(
                "stopping early from hitting the limit configuration set at {}",
                records.len()
            );
            break;
        }
    }

    Ok((records, summary))
}
