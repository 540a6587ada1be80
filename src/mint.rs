//! Mint transaction classification.
//!
//! Looks at the UTXOs of an asset's initial mint transaction and decides
//! whether it was a paid sale or a free community distribution:
//!
//! - **Community**: one of the payers also receives an output (the minting
//!   party taking its change back). The NFT leaves for free.
//! - **Mint**: no payer receives an output. Outputs are the seller's income,
//!   the platform cost, and the NFT sent to the buyer with the minimum UTXO.

use crate::ada::Ada;
use crate::blockfrost::TxUtxo;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MintError {
    #[error("Malformed {kind} mint transaction: need at least {required} outputs, found {found}")]
    MalformedMintTransaction {
        kind: MintType,
        required: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MintType {
    Community,
    Mint,
}

impl fmt::Display for MintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintType::Community => write!(f, "Community"),
            MintType::Mint => write!(f, "Mint"),
        }
    }
}

/// A UTXO reduced to what the classifier looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoView {
    pub amount: Ada,
    /// 1 when the output carries a native asset next to ADA
    pub holder: u8,
    pub address: String,
}

impl UtxoView {
    pub fn new(address: impl Into<String>, amount: Ada, holder: bool) -> Self {
        Self {
            amount,
            holder: u8::from(holder),
            address: address.into(),
        }
    }
}

impl From<&TxUtxo> for UtxoView {
    fn from(utxo: &TxUtxo) -> Self {
        Self::new(
            utxo.address.clone(),
            Ada::from_amounts(&utxo.amount),
            utxo.amount.len() > 1,
        )
    }
}

/// Economics derived from a mint transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintFields {
    pub kind: MintType,
    pub income: Ada,
    pub cost: Ada,
    pub min_utxo: Ada,
    /// Buyer address for a sale, receiving address for a community mint
    pub address: String,
    pub price: Ada,
}

/// Classifies mint transactions. `min_utxo` is the ADA a minting service
/// sends along with a sold NFT.
#[derive(Debug, Clone, Copy)]
pub struct MintClassifier {
    min_utxo: Ada,
}

impl Default for MintClassifier {
    fn default() -> Self {
        Self::new(Ada::from_ada(2))
    }
}

impl MintClassifier {
    pub fn new(min_utxo: Ada) -> Self {
        Self { min_utxo }
    }

    pub fn classify(
        &self,
        inputs: &[UtxoView],
        outputs: &[UtxoView],
        fees: Ada,
    ) -> Result<MintFields, MintError> {
        let payers: HashSet<&str> = inputs.iter().map(|i| i.address.as_str()).collect();
        let mut unpaid: Vec<&UtxoView> = outputs
            .iter()
            .filter(|o| !payers.contains(o.address.as_str()))
            .collect();

        if unpaid.len() != outputs.len() {
            // Stable sort: plain ADA outputs first, NFT holder last
            unpaid.sort_by_key(|o| o.holder);

            let first = unpaid.first().ok_or(MintError::MalformedMintTransaction {
                kind: MintType::Community,
                required: 1,
                found: 0,
            })?;
            let receiver = unpaid.get(1).unwrap_or(first);

            return Ok(MintFields {
                kind: MintType::Community,
                income: Ada::ZERO,
                cost: first.amount,
                min_utxo: receiver.amount,
                address: receiver.address.clone(),
                price: Ada::ZERO,
            });
        }

        let mut sorted: Vec<&UtxoView> = outputs.iter().collect();
        sorted.sort_by_key(|o| (o.holder, Reverse(o.amount)));

        let [income, cost, buyer, ..] = sorted.as_slice() else {
            return Err(MintError::MalformedMintTransaction {
                kind: MintType::Mint,
                required: 3,
                found: sorted.len(),
            });
        };

        let price = income.amount + cost.amount + self.min_utxo + fees;
        Ok(MintFields {
            kind: MintType::Mint,
            income: income.amount,
            cost: cost.amount,
            min_utxo: self.min_utxo,
            address: buyer.address.clone(),
            price,
        })
    }

    /// Classify straight from the API's UTXO lists
    pub fn classify_utxos(
        &self,
        inputs: &[TxUtxo],
        outputs: &[TxUtxo],
        fees: Ada,
    ) -> Result<MintFields, MintError> {
        let inputs: Vec<UtxoView> = inputs.iter().map(UtxoView::from).collect();
        let outputs: Vec<UtxoView> = outputs.iter().map(UtxoView::from).collect();
        self.classify(&inputs, &outputs, fees)
    }
}
