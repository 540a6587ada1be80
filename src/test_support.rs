//! In-memory [`ChainApi`] used by unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::blockfrost::{
    AddressContent, AddressTransaction, AmountEntry, ApiError, AssetAddress, AssetDetails,
    ChainApi, PolicyAsset, TxContent, TxMetadataEntry, TxUtxo, TxUtxos, PAGE_SIZE,
};

#[derive(Default)]
pub struct FakeChain {
    pub policy_assets: HashMap<String, Vec<PolicyAsset>>,
    pub assets: HashMap<String, AssetDetails>,
    pub txs: HashMap<String, TxContent>,
    pub utxos: HashMap<String, TxUtxos>,
    pub metadata: HashMap<String, Vec<TxMetadataEntry>>,
    pub holders: HashMap<String, Vec<AssetAddress>>,
    pub addresses: HashMap<String, AddressContent>,
    pub address_txs: HashMap<String, Vec<AddressTransaction>>,
    /// Lookups that fail with a server error, as `"<method>:<key>"`
    pub failing: HashSet<String>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeChain {
    pub fn fail(&mut self, method: &str, key: &str) {
        self.failing.insert(format!("{}:{}", method, key));
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(&format!("{}:", method)))
            .count()
    }

    fn lookup<T: Clone>(
        &self,
        method: &str,
        key: &str,
        table: &HashMap<String, T>,
    ) -> Result<T, ApiError> {
        let id = format!("{}:{}", method, key);
        self.calls.borrow_mut().push(id.clone());
        if self.failing.contains(&id) {
            return Err(ApiError::Status {
                status: 400,
                message: format!("injected failure for {}", id),
            });
        }
        table
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(id))
    }

    fn page<T: Clone>(items: Vec<T>, page: u32) -> Vec<T> {
        items
            .into_iter()
            .skip((page as usize - 1) * PAGE_SIZE)
            .take(PAGE_SIZE)
            .collect()
    }
}

impl ChainApi for FakeChain {
    async fn policy_assets(
        &self,
        policy_id: &str,
        page: u32,
    ) -> Result<Vec<PolicyAsset>, ApiError> {
        let items = self.lookup("policy_assets", policy_id, &self.policy_assets)?;
        Ok(Self::page(items, page))
    }

    async fn asset(&self, asset: &str) -> Result<AssetDetails, ApiError> {
        self.lookup("asset", asset, &self.assets)
    }

    async fn tx(&self, hash: &str) -> Result<TxContent, ApiError> {
        self.lookup("tx", hash, &self.txs)
    }

    async fn tx_utxos(&self, hash: &str) -> Result<TxUtxos, ApiError> {
        self.lookup("tx_utxos", hash, &self.utxos)
    }

    async fn tx_metadata(&self, hash: &str) -> Result<Vec<TxMetadataEntry>, ApiError> {
        self.lookup("tx_metadata", hash, &self.metadata)
    }

    async fn asset_addresses(&self, asset: &str) -> Result<Vec<AssetAddress>, ApiError> {
        self.lookup("asset_addresses", asset, &self.holders)
    }

    async fn address(&self, address: &str) -> Result<AddressContent, ApiError> {
        self.lookup("address", address, &self.addresses)
    }

    async fn address_transactions(
        &self,
        address: &str,
        page: u32,
    ) -> Result<Vec<AddressTransaction>, ApiError> {
        let items = self.lookup("address_transactions", address, &self.address_txs)?;
        Ok(Self::page(items, page))
    }
}

/// An output or input holding `lovelace`, plus one NFT when `nft` is set
pub fn utxo(address: &str, lovelace: u64, nft: bool) -> TxUtxo {
    let mut amount = vec![AmountEntry {
        unit: "lovelace".to_string(),
        quantity: lovelace.to_string(),
    }];
    if nft {
        amount.push(AmountEntry {
            unit: "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a74e4654".to_string(),
            quantity: "1".to_string(),
        });
    }
    TxUtxo {
        address: address.to_string(),
        amount,
    }
}

pub fn tx_utxos(inputs: Vec<TxUtxo>, outputs: Vec<TxUtxo>) -> TxUtxos {
    TxUtxos {
        inputs,
        outputs,
    }
}

pub fn tx_content(block_height: u64, block_time: i64, fees: u64) -> TxContent {
    TxContent {
        block_height,
        block_time,
        slot: block_height * 10,
        fees: fees.to_string(),
        utxo_count: 4,
    }
}

pub fn address_tx(hash: &str, block_time: i64) -> AddressTransaction {
    AddressTransaction {
        tx_hash: hash.to_string(),
        block_time,
    }
}
