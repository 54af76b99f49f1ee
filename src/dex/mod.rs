use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::blockfrost::ChainQuery;
use crate::error::Result;
use crate::models::{PoolDetail, PoolSummary};

pub mod cbor;
pub mod minswap;

pub use minswap::Minswap;

#[async_trait]
pub trait BaseDex: Send + Sync {
    fn identifier(&self) -> &str;

    fn api(&self) -> &dyn ChainQuery;

    async fn pool_addresses(&self) -> Result<BTreeSet<String>>;

    /// Summaries of every pool. Never fetches datums.
    async fn all_pools(&self) -> Result<Vec<PoolSummary>>;

    async fn pool_by_id(&self, pool_id: &str) -> Result<Option<PoolSummary>>;

    /// `pool_by_id` followed by a single datum fetch.
    async fn pool_detail_by_id(&self, pool_id: &str) -> Result<Option<PoolDetail>> {
        match self.pool_by_id(pool_id).await? {
            Some(pool) => pool.hydrate(self.api()).await.map(Some),
            None => Ok(None),
        }
    }

    /// Pools trading the two units, in either order.
    async fn pools_for_pair(&self, unit_a: &str, unit_b: &str) -> Result<Vec<PoolSummary>> {
        let pools = self.all_pools().await?;
        Ok(pools
            .into_iter()
            .filter(|p| {
                (p.unit_a == unit_a && p.unit_b == unit_b)
                    || (p.unit_a == unit_b && p.unit_b == unit_a)
            })
            .collect())
    }
}
