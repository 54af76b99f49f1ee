use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::utxo::assets_from_units;
use crate::models::{
    AssetHistoryEntry, AssetInfo, Assets, BlockfrostUtxo, PoolTransaction, ProtocolParams, TxUtxos, Unit, Utxo,
};
use crate::rate_limit::RateLimiter;

const PAGE_SIZE: u32 = 100;

/// Read/submit surface of the chain indexer.
///
/// Everything above the HTTP layer talks to this trait, so pool discovery,
/// wallets and caches can run against any backend.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// All UTxOs at `address`. An address the indexer has never seen yields
    /// an empty list.
    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>>;

    /// Addresses currently holding `unit`. Empty when nothing holds it.
    async fn asset_addresses(&self, unit: &str) -> Result<Vec<String>>;

    /// Hex CBOR of the datum with the given hash.
    async fn datum_cbor(&self, datum_hash: &str) -> Result<String>;

    async fn asset_transactions(
        &self,
        unit: &str,
        page: u32,
        count: u32,
        ascending: bool,
    ) -> Result<Vec<PoolTransaction>>;

    async fn protocol_parameters(&self) -> Result<ProtocolParams>;

    /// Registry and on-chain metadata of `unit`. `None` when the asset is unknown.
    async fn asset_info(&self, unit: &str) -> Result<Option<AssetInfo>>;

    /// Every mint and burn of `unit`, oldest first.
    async fn asset_history(&self, unit: &str) -> Result<Vec<AssetHistoryEntry>>;

    /// Inputs and outputs of a transaction. `None` when it is not indexed.
    async fn transaction_utxos(&self, tx_hash: &str) -> Result<Option<TxUtxos>>;

    /// Total value held at `address`, empty for unseen addresses.
    async fn address_amount(&self, address: &str) -> Result<Assets>;

    /// Submit a signed transaction, returning its hash.
    async fn submit_tx(&self, cbor: &[u8]) -> Result<String>;
}

#[derive(Deserialize)]
struct AssetAddress {
    address: String,
}

#[derive(Deserialize)]
struct AddressAmount {
    amount: Vec<Unit>,
}

#[derive(Deserialize)]
struct DatumCbor {
    cbor: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

pub struct BlockfrostApi {
    api_url: String,
    project_id: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl BlockfrostApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self::with_client(
            config.network.blockfrost_url(),
            &config.project_id,
            client,
            Arc::new(RateLimiter::new(&config.rate_limit)),
        ))
    }

    pub fn with_client(
        api_url: &str,
        project_id: &str,
        client: reqwest::Client,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            api_url: crate::utils::remove_trailing_slash(api_url),
            project_id: project_id.to_string(),
            client,
            limiter,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    async fn error_from(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(e) if !e.message.is_empty() => format!("{}: {}", e.error, e.message),
            _ => body,
        };
        Error::ExternalApi { status, message }
    }

    /// GET a JSON resource. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.limiter.acquire().await?;
        let url = self.build_url(path);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("project_id", &self.project_id)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(Some(response.json::<T>().await?))
    }

    /// Walk every page of a list endpoint (ascending order).
    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let paged = format!("{}?page={}&count={}&order=asc", path, page, PAGE_SIZE);
            let items: Vec<T> = match self.get_json(&paged).await? {
                Some(items) => items,
                None => break,
            };
            let done = items.len() < PAGE_SIZE as usize;
            all.extend(items);
            if done {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

#[async_trait]
impl ChainQuery for BlockfrostApi {
    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let raw: Vec<BlockfrostUtxo> = self
            .get_all_pages(&format!("addresses/{}/utxos", address))
            .await?;
        raw.into_iter().map(Utxo::try_from).collect()
    }

    async fn asset_addresses(&self, unit: &str) -> Result<Vec<String>> {
        let raw: Vec<AssetAddress> = self
            .get_all_pages(&format!("assets/{}/addresses", unit))
            .await?;
        Ok(raw.into_iter().map(|a| a.address).collect())
    }

    async fn datum_cbor(&self, datum_hash: &str) -> Result<String> {
        let datum: Option<DatumCbor> = self
            .get_json(&format!("scripts/datum/{}/cbor", datum_hash))
            .await?;
        datum.map(|d| d.cbor).ok_or_else(|| Error::ExternalApi {
            status: 404,
            message: format!("datum {} not found", datum_hash),
        })
    }

    async fn asset_transactions(
        &self,
        unit: &str,
        page: u32,
        count: u32,
        ascending: bool,
    ) -> Result<Vec<PoolTransaction>> {
        let order = if ascending { "asc" } else { "desc" };
        let path = format!(
            "assets/{}/transactions?page={}&count={}&order={}",
            unit, page, count, order
        );
        Ok(self.get_json(&path).await?.unwrap_or_default())
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParams> {
        self.get_json("epochs/latest/parameters")
            .await?
            .ok_or_else(|| Error::ExternalApi {
                status: 404,
                message: "protocol parameters not found".to_string(),
            })
    }

    async fn asset_info(&self, unit: &str) -> Result<Option<AssetInfo>> {
        self.get_json(&format!("assets/{}", unit)).await
    }

    async fn asset_history(&self, unit: &str) -> Result<Vec<AssetHistoryEntry>> {
        self.get_all_pages(&format!("assets/{}/history", unit)).await
    }

    async fn transaction_utxos(&self, tx_hash: &str) -> Result<Option<TxUtxos>> {
        self.get_json(&format!("txs/{}/utxos", tx_hash)).await
    }

    async fn address_amount(&self, address: &str) -> Result<Assets> {
        let raw: Option<AddressAmount> = self.get_json(&format!("addresses/{}", address)).await?;
        match raw {
            Some(raw) => assets_from_units(&raw.amount),
            None => Ok(Assets::new()),
        }
    }

    async fn submit_tx(&self, cbor: &[u8]) -> Result<String> {
        self.limiter.acquire().await?;
        let url = self.build_url("tx/submit");
        tracing::debug!("POST {} ({} bytes)", url, cbor.len());

        let response = self
            .client
            .post(&url)
            .header("project_id", &self.project_id)
            .header(reqwest::header::CONTENT_TYPE, "application/cbor")
            .body(cbor.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let tx_hash: String = response.json().await?;
        tracing::info!("Submitted transaction {}", tx_hash);
        Ok(tx_hash)
    }
}
