//! Asset metadata lookups backed by an on-disk cache.
//!
//! Each asset is stored at `<cache_dir>/assets/<unit>/asset.json` and read
//! back on later lookups until explicitly refreshed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::blockfrost::ChainQuery;
use crate::cache::{load_from_file, save_to_file, write_timestamp};
use crate::error::{Error, Result};
use crate::models::asset::LOVELACE;
use crate::models::{AssetAction, AssetInfo, Assets};

pub const ASSET_FILE: &str = "asset.json";

/// Decimals of lovelace when shown as ADA.
pub const ADA_DECIMALS: u32 = 6;

/// Minted total of an asset and how much of it has left the minting addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supply {
    /// Minted minus burned.
    pub total: u64,
    /// Still held by addresses that received freshly minted tokens.
    pub treasury: u64,
    pub circulating: u64,
}

#[derive(Clone)]
pub struct AssetRegistry {
    api: Arc<dyn ChainQuery>,
    dir: PathBuf,
}

impl AssetRegistry {
    pub fn new(api: Arc<dyn ChainQuery>, cache_dir: &Path) -> Self {
        Self {
            api,
            dir: cache_dir.join("assets"),
        }
    }

    pub fn info_path(&self, unit: &str) -> PathBuf {
        self.dir.join(unit).join(ASSET_FILE)
    }

    /// Fetch the latest metadata of `unit` and overwrite its cache entry.
    pub async fn update(&self, unit: &str) -> Result<Option<AssetInfo>> {
        let Some(info) = self.api.asset_info(unit).await? else {
            tracing::warn!("Asset {} not found", unit);
            return Ok(None);
        };
        let path = self.info_path(unit);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        save_to_file(&info, &path)?;
        write_timestamp(&self.dir)?;
        Ok(Some(info))
    }

    /// Cached metadata of `unit`, fetched when missing or when `refresh` is set.
    pub async fn info(&self, unit: &str, refresh: bool) -> Result<Option<AssetInfo>> {
        let path = self.info_path(unit);
        if !refresh && path.exists() {
            return load_from_file(&path).map(Some);
        }
        self.update(unit).await
    }

    /// Refresh many assets with at most `concurrency` lookups in flight.
    /// Failures are logged and skipped. Returns how many were updated.
    pub async fn update_all(&self, units: Vec<String>, concurrency: usize) -> usize {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(units.len());

        for unit in units {
            let registry = self.clone();
            let sem = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok()?;
                match registry.update(&unit).await {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::warn!("Skipping asset {}: {}", unit, e);
                        None
                    }
                }
            }));
        }

        let mut updated = 0;
        for handle in handles {
            if let Ok(Some(_)) = handle.await {
                updated += 1;
            }
        }
        updated
    }

    /// 6 for lovelace, the registry decimals otherwise, 0 for unknown assets.
    pub async fn decimals(&self, unit: &str) -> Result<u32> {
        if unit == LOVELACE {
            return Ok(ADA_DECIMALS);
        }
        Ok(self.info(unit, false).await?.map_or(0, |i| i.decimals()))
    }

    /// `ADA` for lovelace, see [`AssetInfo::ticker`] otherwise.
    pub async fn ticker(&self, unit: &str) -> Result<String> {
        if unit == LOVELACE {
            return Ok("ADA".to_string());
        }
        self.info(unit, false)
            .await?
            .map(|i| i.ticker())
            .ok_or_else(|| Error::UnknownAsset(unit.to_string()))
    }

    /// Every quantity in `assets` scaled by its asset's decimals.
    pub async fn naturalize(&self, assets: &Assets) -> Result<BTreeMap<String, String>> {
        let mut decimals = HashMap::new();
        for unit in assets.units() {
            decimals.insert(unit.to_string(), self.decimals(unit).await?);
        }
        Ok(assets.naturalize(|unit| decimals.get(unit).copied().unwrap_or(0)))
    }

    /// Minted supply of `unit` and the part that left the addresses freshly
    /// minted tokens were sent to.
    pub async fn supply(&self, unit: &str) -> Result<Supply> {
        let history = self.api.asset_history(unit).await?;

        let mut total: u64 = 0;
        let mut minters = BTreeSet::new();
        for entry in &history {
            let quantity = entry.quantity()?;
            match entry.action {
                AssetAction::Minted => {
                    total = total.checked_add(quantity).ok_or_else(|| {
                        Error::Decode(format!("minted supply of {} overflows", unit))
                    })?;
                    let Some(utxos) = self.api.transaction_utxos(&entry.tx_hash).await? else {
                        tracing::warn!("Mint transaction {} is not indexed", entry.tx_hash);
                        continue;
                    };
                    minters.extend(
                        utxos
                            .outputs
                            .into_iter()
                            .filter(|o| o.amount.iter().any(|a| a.unit == unit))
                            .map(|o| o.address),
                    );
                }
                AssetAction::Burned => total = total.saturating_sub(quantity),
            }
        }

        let mut treasury: u64 = 0;
        for address in &minters {
            let held = self.api.address_amount(address).await?.quantity(unit);
            treasury = treasury.saturating_add(held);
        }
        tracing::debug!("{}: {} minted, {} held by {} minting address(es)", unit, total, treasury, minters.len());

        Ok(Supply {
            total,
            treasury,
            circulating: total.saturating_sub(treasury),
        })
    }
}
