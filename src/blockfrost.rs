//! Blockfrost REST client with rate limiting, timeouts and retry logic.
//!
//! Provides a wrapper around the Blockfrost Cardano API with:
//! - Rate limiting (requests per second)
//! - Per-call timeout
//! - Bounded exponential backoff on transient failures (network, 429, 5xx)
//! - Typed errors; `404 Not Found` is reported separately so callers can
//!   treat it as "no data"
//!
//! Consumers depend on the [`ChainApi`] trait rather than on the HTTP client.

use crate::config::{ApiConfig, RateLimitConfig};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Items per page on paginated endpoints
pub const PAGE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Blockfrost error: status={status}, message={message}")]
    Status { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Gave up on {path} after {attempts} attempts: {last}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last: String,
    },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Error body returned by Blockfrost
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    status_code: Option<u16>,
    error: Option<String>,
    message: Option<String>,
}

// ============================================================================
// Response models
// ============================================================================

/// Entry of `GET /assets/policy/{policy_id}`
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyAsset {
    pub asset: String,
}

/// `GET /assets/{asset}`
#[derive(Debug, Clone, Deserialize)]
pub struct AssetDetails {
    pub asset: String,
    pub policy_id: String,
    #[serde(default)]
    pub asset_name: Option<String>,
    pub fingerprint: String,
    #[serde(default)]
    pub initial_mint_tx_hash: Option<String>,
    #[serde(default)]
    pub onchain_metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// `GET /txs/{hash}`
#[derive(Debug, Clone, Deserialize)]
pub struct TxContent {
    pub block_height: u64,
    pub block_time: i64,
    pub slot: u64,
    /// Fee in lovelace
    pub fees: String,
    pub utxo_count: u32,
}

/// `GET /txs/{hash}/utxos`
#[derive(Debug, Clone, Deserialize)]
pub struct TxUtxos {
    pub inputs: Vec<TxUtxo>,
    pub outputs: Vec<TxUtxo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxUtxo {
    pub address: String,
    pub amount: Vec<AmountEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmountEntry {
    pub unit: String,
    pub quantity: String,
}

/// Entry of `GET /txs/{hash}/metadata`
#[derive(Debug, Clone, Deserialize)]
pub struct TxMetadataEntry {
    pub label: String,
    #[serde(default)]
    pub json_metadata: serde_json::Value,
}

/// Entry of `GET /assets/{asset}/addresses`
#[derive(Debug, Clone, Deserialize)]
pub struct AssetAddress {
    pub address: String,
    pub quantity: String,
}

/// `GET /addresses/{address}`
#[derive(Debug, Clone, Deserialize)]
pub struct AddressContent {
    pub address: String,
    #[serde(default)]
    pub stake_address: Option<String>,
}

/// Entry of `GET /addresses/{address}/transactions`
#[derive(Debug, Clone, Deserialize)]
pub struct AddressTransaction {
    pub tx_hash: String,
    pub block_time: i64,
}

// ============================================================================
// Chain access seam
// ============================================================================

/// Lookups the collectors need from the indexer.
///
/// Paginated methods take a 1-based page number and return at most
/// [`PAGE_SIZE`] items.
#[allow(async_fn_in_trait)]
pub trait ChainApi {
    async fn policy_assets(&self, policy_id: &str, page: u32)
        -> Result<Vec<PolicyAsset>, ApiError>;

    async fn asset(&self, asset: &str) -> Result<AssetDetails, ApiError>;

    async fn tx(&self, hash: &str) -> Result<TxContent, ApiError>;

    async fn tx_utxos(&self, hash: &str) -> Result<TxUtxos, ApiError>;

    async fn tx_metadata(&self, hash: &str) -> Result<Vec<TxMetadataEntry>, ApiError>;

    async fn asset_addresses(&self, asset: &str) -> Result<Vec<AssetAddress>, ApiError>;

    async fn address(&self, address: &str) -> Result<AddressContent, ApiError>;

    async fn address_transactions(
        &self,
        address: &str,
        page: u32,
    ) -> Result<Vec<AddressTransaction>, ApiError>;
}

/// Rate-limited Blockfrost client.
pub struct BlockfrostClient {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    rate_limiter: DefaultDirectRateLimiter,
    config: RateLimitConfig,
}

/// Outcome of one HTTP attempt
enum Attempt<R> {
    Done(Result<R, ApiError>),
    Retry(String),
}

impl BlockfrostClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let limits = config.rate_limits.clone();
        let quota = Quota::per_second(
            NonZeroU32::new(limits.requests_per_second).unwrap_or(NonZeroU32::MIN),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(limits.request_timeout_secs.max(1)))
            .user_agent(concat!("cardano-asset-export/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            rate_limiter: RateLimiter::direct(quota),
            config: limits,
        })
    }

    /// Whether an HTTP status is worth retrying
    fn is_transient_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }

    /// GET a JSON resource with bounded retry.
    async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, ApiError> {
        let mut delay = Duration::from_millis(self.config.base_delay_ms);
        let max_delay = Duration::from_secs(30);
        let attempts = self.config.max_retries + 1;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            self.rate_limiter.until_ready().await;

            let reason = match self.attempt(path, query).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(reason) => reason,
            };

            if attempt >= attempts {
                return Err(ApiError::RetriesExhausted {
                    path: path.to_string(),
                    attempts,
                    last: reason,
                });
            }

            warn!(
                "[attempt {}/{}] {} on {}, retrying in {:?}",
                attempt, attempts, reason, path, delay
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }

    async fn attempt<R: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Attempt<R> {
        let url = format!("{}{}", self.base_url, path);

        let response = match self
            .client
            .get(&url)
            .header("project_id", &self.project_id)
            .query(query)
            .send()
            .await
        {
            Ok(resp) => resp,
            // Network errors and timeouts are transient
            Err(e) => return Attempt::Retry(format!("network error: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            return Attempt::Done(match response.bytes().await {
                Ok(body) => serde_json::from_slice(&body).map_err(ApiError::from),
                Err(e) => Err(ApiError::Http(e)),
            });
        }

        let code = status.as_u16();
        if Self::is_transient_status(code) {
            return Attempt::Retry(format!("HTTP {}", code));
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body
                .message
                .or(body.error)
                .unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };

        if code == 404 {
            debug!("{} not found: {}", path, message);
            return Attempt::Done(Err(ApiError::NotFound(path.to_string())));
        }

        Attempt::Done(Err(ApiError::Status {
            status: code,
            message,
        }))
    }

    fn page_query(page: u32) -> [(&'static str, String); 3] {
        [
            ("page", page.to_string()),
            ("count", PAGE_SIZE.to_string()),
            ("order", "asc".to_string()),
        ]
    }
}

impl ChainApi for BlockfrostClient {
    async fn policy_assets(
        &self,
        policy_id: &str,
        page: u32,
    ) -> Result<Vec<PolicyAsset>, ApiError> {
        self.get(&format!("/assets/policy/{}", policy_id), &Self::page_query(page))
            .await
    }

    async fn asset(&self, asset: &str) -> Result<AssetDetails, ApiError> {
        self.get(&format!("/assets/{}", asset), &[]).await
    }

    async fn tx(&self, hash: &str) -> Result<TxContent, ApiError> {
        self.get(&format!("/txs/{}", hash), &[]).await
    }

    async fn tx_utxos(&self, hash: &str) -> Result<TxUtxos, ApiError> {
        self.get(&format!("/txs/{}/utxos", hash), &[]).await
    }

    async fn tx_metadata(&self, hash: &str) -> Result<Vec<TxMetadataEntry>, ApiError> {
        self.get(&format!("/txs/{}/metadata", hash), &[]).await
    }

    async fn asset_addresses(&self, asset: &str) -> Result<Vec<AssetAddress>, ApiError> {
        self.get(&format!("/assets/{}/addresses", asset), &[]).await
    }

    async fn address(&self, address: &str) -> Result<AddressContent, ApiError> {
        self.get(&format!("/addresses/{}", address), &[]).await
    }

    async fn address_transactions(
        &self,
        address: &str,
        page: u32,
    ) -> Result<Vec<AddressTransaction>, ApiError> {
        self.get(
            &format!("/addresses/{}/transactions", address),
            &Self::page_query(page),
        )
        .await
    }
}

impl TxContent {
    /// Fee parsed from its lovelace string
    pub fn fee(&self) -> Result<crate::ada::Ada, ApiError> {
        crate::ada::Ada::parse_lovelace(&self.fees)
            .ok_or_else(|| ApiError::InvalidResponse(format!("invalid fee {:?}", self.fees)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ada::Ada;
    use crate::config::PathConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one scripted response per connection; the last one repeats.
    async fn scripted_server(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[n.min(responses.len() - 1)];

                let mut request = vec![0u8; 4096];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn client_for(base_url: String, max_retries: u32) -> BlockfrostClient {
        let config = ApiConfig {
            project_id: "mainnettest".to_string(),
            base_url,
            rate_limits: RateLimitConfig {
                requests_per_second: 1000,
                max_retries,
                base_delay_ms: 1,
                request_timeout_secs: 5,
                ..RateLimitConfig::default()
            },
            paths: PathConfig::default(),
        };
        BlockfrostClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_transient_statuses_are_retried() {
        let (url, hits) = scripted_server(vec![(503, "{}"), (429, "{}"), (200, "[]")]).await;
        let client = client_for(url, 3);

        let holders = client.asset_addresses("a").await.unwrap();

        assert!(holders.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (url, hits) = scripted_server(vec![(500, "{}")]).await;
        let client = client_for(url, 2);

        let err = client.asset("a").await.unwrap_err();

        match err {
            ApiError::RetriesExhausted { path, attempts, last } => {
                assert_eq!(path, "/assets/a");
                assert_eq!(attempts, 3);
                assert_eq!(last, "HTTP 500");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (url, hits) = scripted_server(vec![(
            404,
            r#"{"status_code":404,"error":"Not Found","message":"The requested component has not been found."}"#,
        )])
        .await;
        let client = client_for(url, 3);

        let err = client.asset("a").await.unwrap_err();

        assert!(matches!(err, ApiError::NotFound(ref path) if path == "/assets/a"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_error_keeps_message() {
        let (url, _) = scripted_server(vec![(
            402,
            r#"{"status_code":402,"error":"Project Over Limit","message":"Usage is over limit."}"#,
        )])
        .await;
        let client = client_for(url, 3);

        let err = client.tx("abc").await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::Status { status: 402, ref message } if message == "Usage is over limit."
        ));
    }

    #[test]
    fn test_is_transient_status() {
        assert!(BlockfrostClient::is_transient_status(429));
        assert!(BlockfrostClient::is_transient_status(500));
        assert!(BlockfrostClient::is_transient_status(503));
        assert!(!BlockfrostClient::is_transient_status(400));
        assert!(!BlockfrostClient::is_transient_status(402));
        assert!(!BlockfrostClient::is_transient_status(404));
    }

    #[test]
    fn test_tx_content_fee() {
        let tx: TxContent = serde_json::from_str(
            r#"{
                "hash": "6a116482aa5ea173d5a1a52f62599e7a9e8a828c2a7b882248793396c49bbd2d",
                "block": "356b7d7dbb696ccd12775c016941057a9dc70898d87a63fc752271bb46856940",
                "block_height": 6236060,
                "block_time": 1635505891,
                "slot": 42000000,
                "index": 1,
                "output_amount": [{"unit": "lovelace", "quantity": "42000000"}],
                "fees": "182485",
                "deposit": "0",
                "size": 433,
                "invalid_before": null,
                "invalid_hereafter": "13885913",
                "utxo_count": 4,
                "withdrawal_count": 0,
                "valid_contract": true
            }"#,
        )
        .unwrap();
        assert_eq!(tx.fee().unwrap(), Ada::from_lovelace(182_485));
        assert_eq!(tx.utxo_count, 4);

        let bad = TxContent {
            fees: "n/a".to_string(),
            ..tx
        };
        assert!(matches!(bad.fee(), Err(ApiError::InvalidResponse(_))));
    }

    #[test]
    fn test_asset_details_without_metadata() {
        let details: AssetDetails = serde_json::from_str(
            r#"{
                "asset": "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a7nutcoin",
                "policy_id": "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a7",
                "asset_name": "6e7574636f696e",
                "fingerprint": "asset1pkpwyknlvul7az0xx8czhl60pyel45rpje4z8w",
                "quantity": "12000",
                "initial_mint_tx_hash": "6804edf9712d2b619edb6ac86861fe93a730693183a262b165fcc1ba1bc99cad",
                "mint_or_burn_count": 1,
                "onchain_metadata": null,
                "metadata": null
            }"#,
        )
        .unwrap();
        assert!(details.onchain_metadata.is_none());
        assert_eq!(details.asset_name.as_deref(), Some("6e7574636f696e"));
    }

    #[test]
    fn test_models_skip_unused_fields() {
        let txs: Vec<AddressTransaction> = serde_json::from_str(
            r#"[{"tx_hash": "8788591983aa73981fc92d6cddbbe643959f5a784e84b8bee0db15823f575a5b", "tx_index": 6, "block_height": 69, "block_time": 1635505891}]"#,
        )
        .unwrap();
        assert_eq!(txs[0].block_time, 1_635_505_891);

        let assets: Vec<PolicyAsset> = serde_json::from_str(
            r#"[{"asset": "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a7", "quantity": "1"}]"#,
        )
        .unwrap();
        assert_eq!(assets.len(), 1);

        let utxos: TxUtxos = serde_json::from_str(
            r#"{"hash": "1e043f10", "inputs": [], "outputs": [{"address": "addr1q9", "amount": [{"unit": "lovelace", "quantity": "42000000"}], "output_index": 0}]}"#,
        )
        .unwrap();
        assert_eq!(Ada::from_amounts(&utxos.outputs[0].amount), Ada::from_ada(42));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ApiError::NotFound("/assets/x".into()).is_not_found());
        assert!(!ApiError::InvalidResponse("x".into()).is_not_found());
    }
}
