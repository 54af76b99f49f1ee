use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::BaseDex;
use crate::blockfrost::ChainQuery;
use crate::error::Result;
use crate::models::pool::{factory_unit, pool_nft_unit, POOL_NFT_POLICY_ID};
use crate::models::{PoolDetail, PoolGeneration, PoolSummary};
use crate::utils::join_policy_id;

const IDENTIFIER: &str = "MINSWAP";

pub struct Minswap {
    api: Arc<dyn ChainQuery>,
    generation: PoolGeneration,
}

impl Minswap {
    pub fn new(api: Arc<dyn ChainQuery>) -> Self {
        Self {
            api,
            generation: PoolGeneration::V1,
        }
    }

    /// Hydrate many pools, at most `concurrency` datum fetches in flight.
    /// Pools whose datum cannot be fetched or parsed are logged and skipped.
    pub async fn hydrate_all(&self, pools: Vec<PoolSummary>, concurrency: usize) -> Vec<PoolDetail> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(pools.len());

        for pool in pools {
            let api = Arc::clone(&self.api);
            let sem = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok()?;
                match pool.hydrate(api.as_ref()).await {
                    Ok(detail) => Some(detail),
                    Err(e) => {
                        tracing::warn!("Skipping pool {}: {}", pool.pool_id, e);
                        None
                    }
                }
            }));
        }

        let mut details = Vec::new();
        for handle in handles {
            if let Ok(Some(detail)) = handle.await {
                details.push(detail);
            }
        }
        details
    }
}

/// Accepts `<name>`, `<policy><name>` or `<policy>.<name>`.
fn normalize_pool_id(pool_id: &str) -> String {
    let joined = join_policy_id(pool_id);
    joined
        .strip_prefix(POOL_NFT_POLICY_ID)
        .map(str::to_string)
        .unwrap_or(joined)
}

#[async_trait]
impl BaseDex for Minswap {
    fn identifier(&self) -> &str {
        IDENTIFIER
    }

    fn api(&self) -> &dyn ChainQuery {
        self.api.as_ref()
    }

    /// Every address currently holding the factory token. Re-queried on each
    /// call, so new pool addresses show up without configuration.
    async fn pool_addresses(&self) -> Result<BTreeSet<String>> {
        let addresses = self.api.asset_addresses(&factory_unit()).await?;
        Ok(addresses.into_iter().collect())
    }

    async fn all_pools(&self) -> Result<Vec<PoolSummary>> {
        let factory = factory_unit();
        let addresses = self.pool_addresses().await?;
        tracing::debug!("Found {} pool addresses", addresses.len());

        let mut pools = Vec::new();
        for address in &addresses {
            let utxos = self.api.address_utxos(address).await?;
            for utxo in utxos.iter().filter(|u| u.has_asset(&factory)) {
                match PoolSummary::from_utxo(utxo, self.generation) {
                    Ok(pool) => pools.push(pool),
                    Err(e) => tracing::warn!("Skipping UTxO {}: {}", utxo.out_ref(), e),
                }
            }
        }
        pools.sort_by(|a, b| a.pool_id.cmp(&b.pool_id));
        pools.dedup_by(|a, b| a.pool_id == b.pool_id);

        tracing::info!("[{}] {} pools", IDENTIFIER, pools.len());
        Ok(pools)
    }

    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<PoolSummary>> {
        let nft = pool_nft_unit(&normalize_pool_id(pool_id));
        for address in self.api.asset_addresses(&nft).await? {
            let utxos = self.api.address_utxos(&address).await?;
            if let Some(utxo) = utxos.iter().find(|u| u.has_asset(&nft)) {
                return PoolSummary::from_utxo(utxo, self.generation).map(Some);
            }
        }
        Ok(None)
    }
}
