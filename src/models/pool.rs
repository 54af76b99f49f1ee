//! Pool state, in two stages.
//!
//! [`PoolSummary`] is built from the pool UTxO alone and is what bulk listing
//! returns. [`PoolDetail`] adds the fields that live only in the pool datum and
//! is produced by [`PoolSummary::hydrate`], which costs one datum fetch.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use crate::blockfrost::ChainQuery;
use crate::config::Network;
use crate::dex::cbor::{
    asset_class_unit, constr_fields, constr_index, decode_cbor, value_to_hex, value_to_u64,
};
use crate::error::{Error, Result};
use crate::math;
use crate::models::address::Address;
use crate::models::asset::{unit_sort_key, LOVELACE};
use crate::models::{Assets, Utxo};

pub const FACTORY_POLICY_ID: &str = "13aa2accf2e1561723aa26871e071fdf32c867cff7e7d50ad470d62f";
/// "MINSWAP"
pub const FACTORY_ASSET_NAME: &str = "4d494e53574150";
pub const LP_POLICY_ID: &str = "e4214b7cce62ac6fbba385d164df48e157eae5863521b4b67ca71d86";
pub const POOL_NFT_POLICY_ID: &str = "0be55d262b29f564998ff81efe21bdc0022621c12f15af08d0f2ddb1";

/// Unit of the token every pool UTxO carries.
pub fn factory_unit() -> String {
    format!("{}{}", FACTORY_POLICY_ID, FACTORY_ASSET_NAME)
}

/// Unit of the NFT identifying `pool_id`.
pub fn pool_nft_unit(pool_id: &str) -> String {
    format!("{}{}", POOL_NFT_POLICY_ID, pool_id)
}

/// Contract generation of a pool. Determines the swap fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PoolGeneration {
    #[default]
    V1,
}

impl PoolGeneration {
    pub fn fee_bps(&self) -> u64 {
        match self {
            PoolGeneration::V1 => 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSummary {
    /// Asset name of the pool NFT.
    pub pool_id: String,
    pub address: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub unit_a: String,
    pub unit_b: String,
    pub reserve_a: u64,
    pub reserve_b: u64,
    pub lp_token: String,
    pub generation: PoolGeneration,
    pub fee_bps: u64,
    pub datum_hash: Option<String>,
}

impl PoolSummary {
    /// Build a summary from a pool UTxO.
    ///
    /// The UTxO must hold the factory token and exactly one pool NFT. Whatever
    /// is left after removing those and the LP token is the pair; when three
    /// units remain the lovelace is min-ADA padding of a token/token pool.
    pub fn from_utxo(utxo: &Utxo, generation: PoolGeneration) -> Result<Self> {
        let factory = factory_unit();
        if !utxo.has_asset(&factory) {
            return Err(Error::InvalidPoolState(format!(
                "{} does not hold the factory token",
                utxo.out_ref()
            )));
        }

        let nfts: Vec<&str> = utxo
            .amount
            .units()
            .into_iter()
            .filter(|u| u.starts_with(POOL_NFT_POLICY_ID))
            .collect();
        let nft = match nfts.as_slice() {
            [nft] => *nft,
            _ => {
                return Err(Error::InvalidPoolState(format!(
                    "{} holds {} pool NFTs, expected 1",
                    utxo.out_ref(),
                    nfts.len()
                )))
            }
        };
        let pool_id = nft[POOL_NFT_POLICY_ID.len()..].to_string();

        let mut units: Vec<&str> = utxo
            .amount
            .units()
            .into_iter()
            .filter(|u| *u != factory && *u != nft && !u.starts_with(LP_POLICY_ID))
            .collect();
        if units.len() == 3 && units.contains(&LOVELACE) {
            units.retain(|u| *u != LOVELACE);
        }
        if units.len() != 2 {
            return Err(Error::InvalidPoolState(format!(
                "pool {} has {} tradeable assets, expected 2",
                pool_id,
                units.len()
            )));
        }
        units.sort_by(|a, b| unit_sort_key(a).cmp(unit_sort_key(b)));

        let unit_a = units[0].to_string();
        let unit_b = units[1].to_string();
        Ok(Self {
            address: utxo.address.clone(),
            tx_hash: utxo.tx_hash.clone(),
            output_index: utxo.output_index,
            reserve_a: utxo.amount.quantity(&unit_a),
            reserve_b: utxo.amount.quantity(&unit_b),
            unit_a,
            unit_b,
            lp_token: format!("{}{}", LP_POLICY_ID, pool_id),
            generation,
            fee_bps: generation.fee_bps(),
            datum_hash: utxo.data_hash.clone(),
            pool_id,
        })
    }

    pub fn nft_unit(&self) -> String {
        pool_nft_unit(&self.pool_id)
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", short_unit(&self.unit_a), short_unit(&self.unit_b))
    }

    /// `(price of A in B, price of B in A)`.
    pub fn price(&self) -> (f64, f64) {
        (
            math::spot_price(self.reserve_a, self.reserve_b),
            math::spot_price(self.reserve_b, self.reserve_a),
        )
    }

    fn reserves_for(&self, unit_in: &str) -> Result<(u64, u64, &str)> {
        if unit_in == self.unit_a {
            Ok((self.reserve_a, self.reserve_b, &self.unit_b))
        } else if unit_in == self.unit_b {
            Ok((self.reserve_b, self.reserve_a, &self.unit_a))
        } else {
            Err(Error::InvalidPoolState(format!(
                "{} is not traded in pool {}",
                unit_in, self.pool_id
            )))
        }
    }

    /// Output of an exact-in swap of `amount_in` units of `unit_in`, with the
    /// price impact in percent.
    pub fn amount_out(&self, unit_in: &str, amount_in: u64) -> Result<(Assets, f64)> {
        let (reserve_in, reserve_out, unit_out) = self.reserves_for(unit_in)?;
        let out = math::amount_out(reserve_in, reserve_out, amount_in, self.fee_bps);
        let impact = math::price_impact(reserve_in, reserve_out, amount_in, out);
        Ok((Assets::single(unit_out, out), impact))
    }

    /// Input needed to receive exactly `amount_out` units of `unit_out`.
    pub fn amount_in(&self, unit_out: &str, amount_out: u64) -> Result<(Assets, f64)> {
        let (reserve_out, reserve_in, unit_in) = self.reserves_for(unit_out)?;
        let needed = math::amount_in(reserve_in, reserve_out, amount_out, self.fee_bps)
            .ok_or_else(|| {
                Error::InvalidPoolState(format!(
                    "pool {} cannot provide {} {}",
                    self.pool_id, amount_out, unit_out
                ))
            })?;
        let impact = math::price_impact(reserve_in, reserve_out, needed, amount_out);
        Ok((Assets::single(unit_in, needed), impact))
    }

    /// Fetch the pool datum and upgrade to a [`PoolDetail`].
    pub async fn hydrate(&self, api: &dyn ChainQuery) -> Result<PoolDetail> {
        let datum_hash = self.datum_hash.as_deref().ok_or_else(|| {
            Error::InvalidPoolState(format!("pool {} has no datum hash", self.pool_id))
        })?;
        let cbor = api.datum_cbor(datum_hash).await?;
        let datum = PoolDatum::decode(&decode_cbor(&cbor)?, self.network())?;

        let mut datum_units = [datum.unit_a.clone(), datum.unit_b.clone()];
        datum_units.sort_by(|a, b| unit_sort_key(a).cmp(unit_sort_key(b)));
        if datum_units[0] != self.unit_a || datum_units[1] != self.unit_b {
            return Err(Error::InvalidPoolState(format!(
                "datum assets {}/{} do not match pool {} ({}/{})",
                datum.unit_a, datum.unit_b, self.pool_id, self.unit_a, self.unit_b
            )));
        }

        Ok(PoolDetail {
            summary: self.clone(),
            total_lp: datum.total_liquidity,
            root_k_last: datum.root_k_last,
            fee_sharing: datum.fee_sharing,
        })
    }

    fn network(&self) -> Network {
        match Address::from_bech32(&self.address) {
            Ok(a) if !a.is_mainnet() => Network::Preprod,
            _ => Network::Mainnet,
        }
    }
}

fn short_unit(unit: &str) -> String {
    if unit == LOVELACE {
        return "ADA".to_string();
    }
    let name = unit.get(56..).and_then(|n| hex::decode(n).ok());
    match name.and_then(|n| String::from_utf8(n).ok()) {
        Some(s) if !s.is_empty() => s,
        _ => unit.to_string(),
    }
}

/// Profit-sharing recipient stored in the pool datum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSharing {
    pub fee_to: String,
    pub fee_to_datum_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDetail {
    #[serde(flatten)]
    pub summary: PoolSummary,
    pub total_lp: u64,
    pub root_k_last: u64,
    pub fee_sharing: Option<FeeSharing>,
}

impl PoolDetail {
    pub fn pool_id(&self) -> &str {
        &self.summary.pool_id
    }

    /// Estimated LP tokens for zapping `amount` of `unit_in` into the pool.
    /// The batcher settles against execution-time reserves, so the real
    /// amount can differ.
    pub fn zap_in_lp(&self, unit_in: &str, amount: u64) -> Result<u64> {
        let (reserve_in, reserve_out, _) = self.summary.reserves_for(unit_in)?;
        Ok(math::zap_in_lp(
            reserve_in,
            reserve_out,
            self.total_lp,
            amount,
            self.summary.fee_bps,
        ))
    }
}

/// `Constr 0 [asset_a, asset_b, total_liquidity, root_k_last, Maybe fee_sharing]`
struct PoolDatum {
    unit_a: String,
    unit_b: String,
    total_liquidity: u64,
    root_k_last: u64,
    fee_sharing: Option<FeeSharing>,
}

impl PoolDatum {
    fn decode(v: &Value, network: Network) -> Result<Self> {
        let fields = constr_fields(v)?;
        if fields.len() != 5 {
            return Err(Error::InvalidPoolState(format!(
                "pool datum expected 5 fields, got {}",
                fields.len()
            )));
        }

        let fee_sharing = match constr_index(&fields[4])? {
            0 => {
                let sharing = constr_fields(&fields[4])?
                    .first()
                    .ok_or_else(|| Error::Decode("empty fee sharing".to_string()))?;
                let inner = constr_fields(sharing)?;
                if inner.len() != 2 {
                    return Err(Error::Decode("fee sharing expected 2 fields".to_string()));
                }
                let fee_to = Address::from_plutus(&inner[0], network)?.to_bech32()?;
                let fee_to_datum_hash = match constr_index(&inner[1])? {
                    0 => constr_fields(&inner[1])?.first().map(value_to_hex).transpose()?,
                    _ => None,
                };
                Some(FeeSharing {
                    fee_to,
                    fee_to_datum_hash,
                })
            }
            _ => None,
        };

        Ok(Self {
            unit_a: asset_class_unit(&fields[0])?,
            unit_b: asset_class_unit(&fields[1])?,
            total_liquidity: value_to_u64(&fields[2])?,
            root_k_last: value_to_u64(&fields[3])?,
            fee_sharing,
        })
    }
}
