//! In-memory `ChainQuery` used by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::blockfrost::ChainQuery;
use crate::error::{Error, Result};
use crate::models::{AssetHistoryEntry, AssetInfo, Assets, PoolTransaction, ProtocolParams, TxUtxos, Utxo};

#[derive(Default)]
pub struct MockChain {
    utxos: Mutex<HashMap<String, Vec<Utxo>>>,
    holders: Mutex<HashMap<String, Vec<String>>>,
    datums: Mutex<HashMap<String, String>>,
    transactions: Mutex<HashMap<String, Vec<PoolTransaction>>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    params: Mutex<Option<ProtocolParams>>,
    asset_infos: Mutex<HashMap<String, AssetInfo>>,
    histories: Mutex<HashMap<String, Vec<AssetHistoryEntry>>>,
    tx_utxos: Mutex<HashMap<String, TxUtxos>>,
    balances: Mutex<HashMap<String, Assets>>,
    datum_calls: AtomicU64,
    calls: AtomicU64,
}

pub fn mainnet_params() -> ProtocolParams {
    ProtocolParams {
        epoch: 420,
        min_fee_a: 44,
        min_fee_b: 155_381,
        max_tx_size: 16_384,
        coins_per_utxo_size: 4_310,
        price_mem: 0.0577,
        price_step: 0.0000721,
        collateral_percent: Some(150),
        cost_models_raw: Some(HashMap::from([(
            "PlutusV1".to_string(),
            vec![205_665, 812, 1, 1, 1000, 571, 0, 1, 1000, 24_177, 4, 1],
        )])),
    }
}

impl MockChain {
    pub fn add_utxo(&self, utxo: Utxo) {
        let mut utxos = self.utxos.lock().unwrap();
        utxos.entry(utxo.address.clone()).or_default().push(utxo);
    }

    pub fn set_utxos(&self, address: &str, list: Vec<Utxo>) {
        self.utxos.lock().unwrap().insert(address.to_string(), list);
    }

    pub fn add_holder(&self, unit: &str, address: &str) {
        let mut holders = self.holders.lock().unwrap();
        holders.entry(unit.to_string()).or_default().push(address.to_string());
    }

    pub fn add_datum(&self, hash: &str, cbor_hex: &str) {
        self.datums
            .lock()
            .unwrap()
            .insert(hash.to_string(), cbor_hex.to_string());
    }

    pub fn set_transactions(&self, unit: &str, txs: Vec<PoolTransaction>) {
        self.transactions.lock().unwrap().insert(unit.to_string(), txs);
    }

    /// Parameters served instead of [`mainnet_params`].
    pub fn set_params(&self, params: ProtocolParams) {
        *self.params.lock().unwrap() = Some(params);
    }

    pub fn add_asset_info(&self, info: AssetInfo) {
        self.asset_infos.lock().unwrap().insert(info.asset.clone(), info);
    }

    pub fn set_history(&self, unit: &str, history: Vec<AssetHistoryEntry>) {
        self.histories.lock().unwrap().insert(unit.to_string(), history);
    }

    pub fn add_tx_utxos(&self, utxos: TxUtxos) {
        self.tx_utxos.lock().unwrap().insert(utxos.hash.clone(), utxos);
    }

    pub fn set_balance(&self, address: &str, amount: Assets) {
        self.balances.lock().unwrap().insert(address.to_string(), amount);
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn datum_calls(&self) -> u64 {
        self.datum_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainQuery for MockChain {
    async fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        self.count();
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn asset_addresses(&self, unit: &str) -> Result<Vec<String>> {
        self.count();
        Ok(self
            .holders
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .unwrap_or_default())
    }

    async fn datum_cbor(&self, datum_hash: &str) -> Result<String> {
        self.count();
        self.datum_calls.fetch_add(1, Ordering::SeqCst);
        self.datums
            .lock()
            .unwrap()
            .get(datum_hash)
            .cloned()
            .ok_or_else(|| Error::ExternalApi {
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
        self.count();
        let mut txs = self
            .transactions
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .unwrap_or_default();
        if !ascending {
            txs.reverse();
        }
        let start = (page.saturating_sub(1) * count) as usize;
        Ok(txs.into_iter().skip(start).take(count as usize).collect())
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParams> {
        self.count();
        Ok(self.params.lock().unwrap().clone().unwrap_or_else(mainnet_params))
    }

    async fn asset_info(&self, unit: &str) -> Result<Option<AssetInfo>> {
        self.count();
        Ok(self.asset_infos.lock().unwrap().get(unit).cloned())
    }

    async fn asset_history(&self, unit: &str) -> Result<Vec<AssetHistoryEntry>> {
        self.count();
        Ok(self.histories.lock().unwrap().get(unit).cloned().unwrap_or_default())
    }

    async fn transaction_utxos(&self, tx_hash: &str) -> Result<Option<TxUtxos>> {
        self.count();
        Ok(self.tx_utxos.lock().unwrap().get(tx_hash).cloned())
    }

    async fn address_amount(&self, address: &str) -> Result<Assets> {
        self.count();
        Ok(self.balances.lock().unwrap().get(address).cloned().unwrap_or_default())
    }

    async fn submit_tx(&self, cbor: &[u8]) -> Result<String> {
        self.count();
        self.submitted.lock().unwrap().push(cbor.to_vec());
        Ok(hex::encode(crate::tx::encode::blake2b_256(cbor)))
    }
}
