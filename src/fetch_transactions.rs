//! Incoming payment collection for a list of addresses.
//!
//! Lists every transaction of an address, then inspects its UTXOs. Outgoing
//! transactions (the address is among the inputs) are skipped; the rest
//! become one record per transaction with the ADA received and the paying
//! counterparty.

use crate::ada::Ada;
use crate::blockfrost::{AddressTransaction, ChainApi, TxUtxos};
use crate::config::RunConfig;
use crate::pagination::PagedFetcher;
use crate::schemas::{AddressTransactionRecord, Failure, RunSummary, TransactionField};
use chrono::DateTime;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("No addresses configured")]
    NoAddresses,

    #[error("Invalid block time {0}")]
    InvalidBlockTime(i64),
}

/// Records gathered for one address and the lookups that failed
#[derive(Debug, Default)]
pub struct Collected {
    pub records: Vec<AddressTransactionRecord>,
    pub failures: Vec<Failure>,
}

/// Build the record of a transaction paying `address`.
///
/// Returns `None` when the address funded the transaction itself.
pub fn payment_record(
    address: &str,
    tx: &AddressTransaction,
    utxos: &TxUtxos,
) -> Result<Option<AddressTransactionRecord>, TransactionError> {
    if utxos.inputs.iter().any(|i| i.address == address) {
        return Ok(None);
    }

    let transaction_time = DateTime::from_timestamp(tx.block_time, 0)
        .ok_or(TransactionError::InvalidBlockTime(tx.block_time))?;

    let mut amount: Option<Ada> = None;
    let mut payer_address = String::new();
    let mut output_utxo_count = 0;

    for output in &utxos.outputs {
        if output.address == address {
            let received = Ada::from_amounts(&output.amount);
            amount = Some(amount.map_or(received, |total| total + received));
        } else {
            output_utxo_count += 1;
            payer_address.clone_from(&output.address);
        }
    }

    Ok(Some(AddressTransactionRecord {
        paid_address: address.to_string(),
        payer_address,
        transaction_hash: tx.tx_hash.clone(),
        transaction_time,
        amount,
        output_utxo_count,
    }))
}

pub struct TransactionCollector<'a, A> {
    api: &'a A,
    fetcher: &'a PagedFetcher,
}

impl<'a, A: ChainApi> TransactionCollector<'a, A> {
    pub fn new(api: &'a A, fetcher: &'a PagedFetcher) -> Self {
        Self { api, fetcher }
    }

    /// Collect the payments received by `address`, at most `limit` of them
    pub async fn collect(&self, address: &str, limit: Option<usize>) -> Collected {
        let mut collected = Collected::default();

        let paged = self
            .fetcher
            .fetch(|page| self.api.address_transactions(address, page), None)
            .await;
        if let Some(e) = &paged.error {
            collected
                .failures
                .push(Failure::new(address, "address_transactions", e));
        }
        debug!("{}: {} transactions listed", address, paged.items.len());

        for tx in &paged.items {
            if limit.is_some_and(|l| collected.records.len() >= l) {
                break;
            }

            debug!("processing transaction {}", tx.tx_hash);
            let utxos = match self.api.tx_utxos(&tx.tx_hash).await {
                Ok(utxos) => utxos,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!("{}: UTXO lookup failed: {}", tx.tx_hash, e);
                    collected
                        .failures
                        .push(Failure::new(&tx.tx_hash, "tx_utxos", e));
                    continue;
                }
            };

            match payment_record(address, tx, &utxos) {
                Ok(Some(record)) => collected.records.push(record),
                Ok(None) => debug!("{}: sent by {}, skipping", tx.tx_hash, address),
                Err(e) => collected
                    .failures
                    .push(Failure::new(&tx.tx_hash, "tx_utxos", e)),
            }
        }

        collected
    }
}

/// Run the transaction entry point over every configured address
pub async fn collect_addresses<A: ChainApi>(
    api: &A,
    fetcher: &PagedFetcher,
    config: &RunConfig<TransactionField>,
) -> Result<(Vec<AddressTransactionRecord>, RunSummary), TransactionError> {
    if config.addresses.is_empty() {
        return Err(TransactionError::NoAddresses);
    }

    let mut summary = RunSummary {
        found: config.addresses.len(),
        transactions: Some(0),
        ..Default::default()
    };
    info!("found {} addresses", summary.found);

    let collector = TransactionCollector::new(api, fetcher);
    let mut records: Vec<AddressTransactionRecord> = Vec::new();

    for address in &config.addresses {
        info!("processing address {} {}", summary.processed + 1, address);

        let remaining = config.limit.map(|l| l.saturating_sub(records.len()));
        let Collected {
            records: found,
            failures,
        } = collector.collect(address, remaining).await;

        summary.record_failures(failures);
        summary.processed += 1;
        records.extend(found);
        summary.transactions = Some(records.len());

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
