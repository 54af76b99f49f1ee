//! Asset registry and transaction UTxO payloads.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::utxo::assets_from_units;
use crate::models::{Assets, Unit};

/// Off-chain registry metadata attached to an asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

/// An asset as returned by `/assets/{asset}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub asset: String,
    pub policy_id: String,
    /// Hex encoded name. Absent for assets with an empty name.
    #[serde(default)]
    pub asset_name: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub onchain_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<AssetMetadata>,
}

impl AssetInfo {
    /// Registry decimals, 0 when the asset is not registered.
    pub fn decimals(&self) -> u32 {
        self.metadata.as_ref().and_then(|m| m.decimals).unwrap_or(0)
    }

    /// Registry ticker, else the CIP-25 `symbol`, else the UTF-8 asset name,
    /// else the raw hex name.
    pub fn ticker(&self) -> String {
        if let Some(ticker) = self.metadata.as_ref().and_then(|m| m.ticker.clone()) {
            return ticker;
        }
        let symbol = self
            .onchain_metadata
            .as_ref()
            .and_then(|m| m.get("symbol"))
            .and_then(|s| s.as_str());
        if let Some(symbol) = symbol {
            return symbol.to_string();
        }
        let name_hex = self.asset_name.clone().unwrap_or_default();
        hex::decode(&name_hex)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or(name_hex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetAction {
    Minted,
    Burned,
}

/// One mint or burn, from `/assets/{asset}/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHistoryEntry {
    pub tx_hash: String,
    pub action: AssetAction,
    pub amount: String,
}

impl AssetHistoryEntry {
    pub fn quantity(&self) -> Result<u64> {
        self.amount
            .parse()
            .map_err(|e| Error::Decode(format!("bad amount '{}' in {}: {}", self.amount, self.tx_hash, e)))
    }
}

/// Input or output of a transaction as listed by `/txs/{hash}/utxos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxUtxoEntry {
    pub address: String,
    pub amount: Vec<Unit>,
    /// Set on inputs only: the transaction that created the spent output.
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub output_index: u32,
    #[serde(default)]
    pub data_hash: Option<String>,
    #[serde(default)]
    pub collateral: bool,
}

impl TxUtxoEntry {
    pub fn assets(&self) -> Result<Assets> {
        assets_from_units(&self.amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxUtxos {
    pub hash: String,
    pub inputs: Vec<TxUtxoEntry>,
    pub outputs: Vec<TxUtxoEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtxoSide {
    Input,
    Output,
}

/// One row of the UTxO history cache: a single input or output of a pool
/// transaction, stamped with the block time of that transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxUtxoRecord {
    /// Transaction that consumed (inputs) or created (outputs) the UTxO.
    pub hash: String,
    pub side: UtxoSide,
    pub address: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub output_index: u32,
    pub amount: Assets,
    #[serde(default)]
    pub data_hash: Option<String>,
    pub block_time: i64,
}

impl TxUtxos {
    /// Flatten into cache rows, inputs first. Collateral inputs are skipped.
    pub fn into_records(self, block_time: i64) -> Result<Vec<TxUtxoRecord>> {
        let hash = self.hash;
        let inputs = self
            .inputs
            .into_iter()
            .filter(|e| !e.collateral)
            .map(|e| (UtxoSide::Input, e));
        let outputs = self.outputs.into_iter().map(|e| (UtxoSide::Output, e));
        inputs
            .chain(outputs)
            .map(|(side, e)| {
                Ok(TxUtxoRecord {
                    hash: hash.clone(),
                    side,
                    amount: e.assets()?,
                    address: e.address,
                    tx_hash: e.tx_hash,
                    output_index: e.output_index,
                    data_hash: e.data_hash,
                    block_time,
                })
            })
            .collect()
    }
}
