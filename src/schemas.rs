//! Record schemas.
//!
//! Field names follow the exported column names (camelCase). Absent fields are
//! omitted from JSON output and left empty in CSV output.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::ada::Ada;
use crate::config::FlattenKey;
use crate::mint::{MintFields, MintType};

/// A record the exporter can write and project onto a single field.
pub trait Record: Serialize {
    /// Typed selector of one of the record's fields
    type Field;

    fn project(&self, field: &Self::Field) -> Value;
}

/// Format a timestamp as ISO-8601 UTC with milliseconds
pub fn iso_millis(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_time<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_millis(time))
}

fn serialize_opt_time<S: Serializer>(
    time: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time {
        Some(t) => serialize_time(t, serializer),
        None => serializer.serialize_none(),
    }
}

fn opt_json<T: Serialize>(value: &Option<T>) -> Value {
    value
        .as_ref()
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

// ============================================================================
// PART A: Asset records
// ============================================================================

/// One asset, enriched step by step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// Hex asset id (policy id + asset name)
    pub asset: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_hash: Option<String>,

    /// On-chain (CIP-25) metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    /// Selected metadata fields, keyed `metadata<Field>`
    #[serde(flatten)]
    pub metadata_fields: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_number: Option<String>,

    /// Block height of the mint transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_block: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_slot: Option<u64>,

    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_time"
    )]
    pub mint_transaction_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "mintTransactionUTXOCount",
        skip_serializing_if = "Option::is_none"
    )]
    pub mint_transaction_utxo_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_fees: Option<Ada>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_type: Option<MintType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_income: Option<Ada>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_cost: Option<Ada>,

    #[serde(
        rename = "mintTransactionMinUTXO",
        skip_serializing_if = "Option::is_none"
    )]
    pub mint_transaction_min_utxo: Option<Ada>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_price: Option<Ada>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_holder_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_transaction_stake_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_holder_stake_address: Option<String>,
}

impl AssetRecord {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            ..Default::default()
        }
    }

    /// Column name for a projected metadata field
    pub fn metadata_column(field: &str) -> String {
        format!("metadata{}", field.replace(' ', ""))
    }

    pub fn apply_mint_fields(&mut self, fields: MintFields) {
        self.mint_transaction_type = Some(fields.kind);
        self.mint_transaction_income = Some(fields.income);
        self.mint_transaction_cost = Some(fields.cost);
        self.mint_transaction_min_utxo = Some(fields.min_utxo);
        self.mint_transaction_address = Some(fields.address);
        self.mint_transaction_price = Some(fields.price);
    }
}

/// Selector over [`AssetRecord`] fields, parsed from the exported column name
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum AssetField {
    Asset,
    PolicyId,
    AssetName,
    Fingerprint,
    MintTransactionHash,
    Metadata,
    /// A projected `metadata<Field>` column
    MetadataField(String),
    AssetLabel,
    AssetNumber,
    MintTransactionBlock,
    MintTransactionSlot,
    MintTransactionTime,
    MintTransactionUtxoCount,
    MintTransactionFees,
    MintTransactionType,
    MintTransactionIncome,
    MintTransactionCost,
    MintTransactionMinUtxo,
    MintTransactionAddress,
    MintTransactionPrice,
    CurrentHolderAddress,
    MintTransactionStakeAddress,
    CurrentHolderStakeAddress,
}

impl TryFrom<String> for AssetField {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        let field = match name.as_str() {
            "asset" => AssetField::Asset,
            "policyId" => AssetField::PolicyId,
            "assetName" => AssetField::AssetName,
            "fingerprint" => AssetField::Fingerprint,
            "mintTransactionHash" => AssetField::MintTransactionHash,
            "metadata" => AssetField::Metadata,
            "assetLabel" => AssetField::AssetLabel,
            "assetNumber" => AssetField::AssetNumber,
            "mintTransactionBlock" => AssetField::MintTransactionBlock,
            "mintTransactionSlot" => AssetField::MintTransactionSlot,
            "mintTransactionTime" => AssetField::MintTransactionTime,
            "mintTransactionUTXOCount" => AssetField::MintTransactionUtxoCount,
            "mintTransactionFees" => AssetField::MintTransactionFees,
            "mintTransactionType" => AssetField::MintTransactionType,
            "mintTransactionIncome" => AssetField::MintTransactionIncome,
            "mintTransactionCost" => AssetField::MintTransactionCost,
            "mintTransactionMinUTXO" => AssetField::MintTransactionMinUtxo,
            "mintTransactionAddress" => AssetField::MintTransactionAddress,
            "mintTransactionPrice" => AssetField::MintTransactionPrice,
            "currentHolderAddress" => AssetField::CurrentHolderAddress,
            "mintTransactionStakeAddress" => AssetField::MintTransactionStakeAddress,
            "currentHolderStakeAddress" => AssetField::CurrentHolderStakeAddress,
            other => match other.strip_prefix("metadata") {
                Some(rest) if !rest.is_empty() => AssetField::MetadataField(other.to_string()),
                _ => return Err(format!("unknown asset field {:?}", other)),
            },
        };
        Ok(field)
    }
}

impl FlattenKey for AssetField {
    fn check(&self, metadata: &[String]) -> Result<(), String> {
        match self {
            AssetField::MetadataField(column)
                if !metadata
                    .iter()
                    .any(|field| AssetRecord::metadata_column(field) == *column) =>
            {
                Err(format!(
                    "flatten key {:?} has no matching entry in metadata",
                    column
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Record for AssetRecord {
    type Field = AssetField;

    fn project(&self, field: &AssetField) -> Value {
        match field {
            AssetField::Asset => Value::String(self.asset.clone()),
            AssetField::PolicyId => opt_json(&self.policy_id),
            AssetField::AssetName => opt_json(&self.asset_name),
            AssetField::Fingerprint => opt_json(&self.fingerprint),
            AssetField::MintTransactionHash => opt_json(&self.mint_transaction_hash),
            AssetField::Metadata => opt_json(&self.metadata),
            AssetField::MetadataField(column) => self
                .metadata_fields
                .get(column)
                .cloned()
                .unwrap_or(Value::Null),
            AssetField::AssetLabel => opt_json(&self.asset_label),
            AssetField::AssetNumber => opt_json(&self.asset_number),
            AssetField::MintTransactionBlock => opt_json(&self.mint_transaction_block),
            AssetField::MintTransactionSlot => opt_json(&self.mint_transaction_slot),
            AssetField::MintTransactionTime => opt_json(&self.mint_transaction_time.as_ref().map(iso_millis)),
            AssetField::MintTransactionUtxoCount => opt_json(&self.mint_transaction_utxo_count),
            AssetField::MintTransactionFees => opt_json(&self.mint_transaction_fees),
            AssetField::MintTransactionType => opt_json(&self.mint_transaction_type),
            AssetField::MintTransactionIncome => opt_json(&self.mint_transaction_income),
            AssetField::MintTransactionCost => opt_json(&self.mint_transaction_cost),
            AssetField::MintTransactionMinUtxo => opt_json(&self.mint_transaction_min_utxo),
            AssetField::MintTransactionAddress => opt_json(&self.mint_transaction_address),
            AssetField::MintTransactionPrice => opt_json(&self.mint_transaction_price),
            AssetField::CurrentHolderAddress => opt_json(&self.current_holder_address),
            AssetField::MintTransactionStakeAddress => {
                opt_json(&self.mint_transaction_stake_address)
            }
            AssetField::CurrentHolderStakeAddress => opt_json(&self.current_holder_stake_address),
        }
    }
}

// ============================================================================
// PART B: Address transaction records
// ============================================================================

/// A payment received by a queried address
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressTransactionRecord {
    /// The queried address
    pub paid_address: String,

    /// Last output address that is not the queried address
    pub payer_address: String,

    pub transaction_hash: String,

    #[serde(serialize_with = "serialize_time")]
    pub transaction_time: DateTime<Utc>,

    /// ADA received by the queried address; null when no output pays it
    pub amount: Option<Ada>,

    #[serde(rename = "outputUTXOCount")]
    pub output_utxo_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum TransactionField {
    PaidAddress,
    PayerAddress,
    TransactionHash,
    TransactionTime,
    Amount,
    OutputUtxoCount,
}

impl TryFrom<String> for TransactionField {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        match name.as_str() {
            "paidAddress" => Ok(TransactionField::PaidAddress),
            "payerAddress" => Ok(TransactionField::PayerAddress),
            "transactionHash" => Ok(TransactionField::TransactionHash),
            "transactionTime" => Ok(TransactionField::TransactionTime),
            "amount" => Ok(TransactionField::Amount),
            "outputUTXOCount" => Ok(TransactionField::OutputUtxoCount),
            other => Err(format!("unknown transaction field {:?}", other)),
        }
    }
}

impl FlattenKey for TransactionField {}

impl Record for AddressTransactionRecord {
    type Field = TransactionField;

    fn project(&self, field: &TransactionField) -> Value {
        match field {
            TransactionField::PaidAddress => Value::String(self.paid_address.clone()),
            TransactionField::PayerAddress => Value::String(self.payer_address.clone()),
            TransactionField::TransactionHash => Value::String(self.transaction_hash.clone()),
            TransactionField::TransactionTime => Value::String(iso_millis(&self.transaction_time)),
            TransactionField::Amount => opt_json(&self.amount),
            TransactionField::OutputUtxoCount => Value::from(self.output_utxo_count),
        }
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// A step that failed for one item without stopping the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Asset id, address or transaction hash
    pub item: String,
    pub step: String,
    pub error: String,
}

impl Failure {
    pub fn new(item: impl Into<String>, step: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            item: item.into(),
            step: step.into(),
            error: error.to_string(),
        }
    }
}

/// Progress and outcome of a run, logged when it finishes
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub found: usize,
    pub processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<usize>,
    pub exported: usize,
    pub elapsed_seconds: u64,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn record_failures(&mut self, failures: impl IntoIterator<Item = Failure>) {
        self.failures.extend(failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bare_asset_serializes_only_id() {
        let record = AssetRecord::new("abc");
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"asset":"abc"}"#);
    }

    #[test]
    fn test_asset_column_names() {
        let mut record = AssetRecord::new("abc");
        record.mint_transaction_utxo_count = Some(4);
        record.mint_transaction_min_utxo = Some(Ada::from_ada(2));
        record.mint_transaction_type = Some(MintType::Community);
        record.mint_transaction_time = Some(Utc.timestamp_opt(1_635_505_891, 0).unwrap());
        record
            .metadata_fields
            .insert(AssetRecord::metadata_column("Background Color"), Value::from("red"));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["mintTransactionUTXOCount"], 4);
        assert_eq!(value["mintTransactionMinUTXO"], 2);
        assert_eq!(value["mintTransactionType"], "Community");
        assert_eq!(value["mintTransactionTime"], "2021-10-29T11:11:31.000Z");
        assert_eq!(value["metadataBackgroundColor"], "red");
    }

    #[test]
    fn test_asset_field_parsing() {
        assert_eq!(
            AssetField::try_from("mintTransactionMinUTXO".to_string()),
            Ok(AssetField::MintTransactionMinUtxo)
        );
        assert_eq!(
            AssetField::try_from("metadataName".to_string()),
            Ok(AssetField::MetadataField("metadataName".to_string()))
        );
        assert!(AssetField::try_from("price".to_string()).is_err());
    }

    #[test]
    fn test_asset_projection() {
        let mut record = AssetRecord::new("abc");
        record.mint_transaction_price = Some(Ada::from_lovelace(199_958_060));
        record.metadata_fields.insert("metadataName".into(), Value::from("Ape #1"));

        assert_eq!(record.project(&AssetField::Asset), Value::from("abc"));
        assert_eq!(
            record.project(&AssetField::MintTransactionPrice),
            serde_json::json!(199.95806)
        );
        assert_eq!(
            record.project(&AssetField::MetadataField("metadataName".into())),
            Value::from("Ape #1")
        );
        assert_eq!(record.project(&AssetField::CurrentHolderAddress), Value::Null);
    }

    #[test]
    fn test_transaction_record_serialization() {
        let record = AddressTransactionRecord {
            paid_address: "addr_paid".into(),
            payer_address: String::new(),
            transaction_hash: "tx1".into(),
            transaction_time: Utc.timestamp_opt(0, 0).unwrap(),
            amount: None,
            output_utxo_count: 0,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"paidAddress":"addr_paid","payerAddress":"","transactionHash":"tx1","transactionTime":"1970-01-01T00:00:00.000Z","amount":null,"outputUTXOCount":0}"#
        );
        assert_eq!(record.project(&TransactionField::Amount), Value::Null);
        assert_eq!(record.project(&TransactionField::OutputUtxoCount), Value::from(0));
    }

    #[test]
    fn test_summary_failures() {
        let mut summary = RunSummary::default();
        assert!(!summary.has_failures());
        summary.record_failures([Failure::new("asset1", "mint", "timeout")]);
        assert!(summary.has_failures());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failures"][0]["step"], "mint");
        assert!(json.get("transactions").is_none());
    }
}
