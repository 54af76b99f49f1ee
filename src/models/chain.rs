use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Subset of `/epochs/latest/parameters` needed to balance transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Epoch these parameters were read for.
    #[serde(default)]
    pub epoch: u64,
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub max_tx_size: u64,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub coins_per_utxo_size: u64,
    #[serde(default)]
    pub price_mem: f64,
    #[serde(default)]
    pub price_step: f64,
    #[serde(default)]
    pub collateral_percent: Option<u64>,
    /// Cost models in canonical parameter order, keyed by language.
    #[serde(default)]
    pub cost_models_raw: Option<HashMap<String, Vec<i64>>>,
}

impl ProtocolParams {
    pub fn plutus_v1_cost_model(&self) -> Option<&Vec<i64>> {
        self.cost_models_raw.as_ref().and_then(|m| m.get("PlutusV1"))
    }
}

fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum N {
        Str(String),
        Num(u64),
    }
    match N::deserialize(deserializer)? {
        N::Str(s) => s.parse().map_err(serde::de::Error::custom),
        N::Num(n) => Ok(n),
    }
}

/// A transaction that touched an asset, from `/assets/{asset}/transactions`.
///
/// `block_time` is unix seconds; this is the canonical timestamp form used
/// everywhere in the crate, including the history cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTransaction {
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_height: u64,
    pub block_time: i64,
}
