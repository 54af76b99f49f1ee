//! Wallet backed by a plaintext mnemonic file.
//!
//! Key derivation and signing are behind [`KeyDeriver`] and [`Keychain`] so
//! the wallet logic does not depend on a particular BIP-39/CIP-1852 crate.

use std::fs;
use std::sync::Arc;

use crate::blockfrost::ChainQuery;
use crate::config::{Config, Network};
use crate::error::{Error, Result};
use crate::models::{Address, Assets, Credential, PoolDetail, PoolSummary, ProtocolParams, Utxo};
use crate::tx::builder::TxBuilder;
use crate::tx::encode::{Transaction, TxOutput, VKeyWitness};
use crate::tx::order::{self, message_lines, OrderAccount, SwapRequest};
use crate::utils::now_secs;

pub const COLLATERAL_MIN: u64 = 5_000_000;
pub const COLLATERAL_MAX: u64 = 20_000_000;

pub trait Keychain: Send + Sync {
    fn payment_key_hash(&self) -> [u8; 28];

    fn stake_key_hash(&self) -> Option<[u8; 28]>;

    /// Witness for a transaction body hash.
    fn sign(&self, body_hash: &[u8; 32]) -> VKeyWitness;
}

pub trait KeyDeriver {
    fn generate_mnemonic(&self) -> Result<String>;

    fn derive(&self, mnemonic: &str) -> Result<Box<dyn Keychain>>;
}

pub struct Wallet {
    network: Network,
    api: Arc<dyn ChainQuery>,
    keychain: Box<dyn Keychain>,
    address: Address,
    utxos: Vec<Utxo>,
    params: Option<ProtocolParams>,
}

impl Wallet {
    /// Load `<wallet_dir>/<network>_mnemonic.txt`, generating and saving a new
    /// mnemonic when the file does not exist.
    pub fn open(config: &Config, api: Arc<dyn ChainQuery>, deriver: &dyn KeyDeriver) -> Result<Self> {
        let path = config.mnemonic_path();
        let mnemonic = if path.exists() {
            fs::read_to_string(&path)?.trim().to_string()
        } else {
            let mnemonic = deriver.generate_mnemonic()?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &mnemonic)?;
            tracing::info!("Created new wallet at {}", path.display());
            mnemonic
        };

        let keychain = deriver.derive(&mnemonic)?;
        let address = Address::new(
            config.network,
            Credential::Key(keychain.payment_key_hash()),
            keychain.stake_key_hash().map(Credential::Key),
        );
        tracing::debug!("Wallet address {}", address);

        Ok(Self {
            network: config.network,
            api,
            keychain,
            address,
            utxos: Vec::new(),
            params: None,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Snapshot from the last [`Wallet::refresh`].
    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    /// Re-read the wallet UTxOs. Protocol parameters are fetched again when
    /// none are held or the held ones are from an earlier epoch.
    pub async fn refresh(&mut self) -> Result<&[Utxo]> {
        self.utxos = self.api.address_utxos(&self.address.to_bech32()?).await?;
        let epoch = self.network.epoch_at(now_secs());
        if self.params.as_ref().map_or(true, |p| p.epoch != epoch) {
            let params = self.api.protocol_parameters().await?;
            tracing::debug!("Loaded protocol parameters for epoch {}", params.epoch);
            self.params = Some(params);
        }
        Ok(&self.utxos)
    }

    /// Sum of every UTxO in the snapshot.
    pub fn balance(&self) -> Result<Assets> {
        self.utxos
            .iter()
            .try_fold(Assets::new(), |acc, u| acc.checked_add(&u.amount))
    }

    /// Smallest pure-lovelace UTxO holding between 5 and 20 ADA.
    pub fn collateral(&self) -> Option<&Utxo> {
        self.utxos
            .iter()
            .filter(|u| u.is_pure_lovelace())
            .filter(|u| (COLLATERAL_MIN..=COLLATERAL_MAX).contains(&u.amount.coin()))
            .min_by_key(|u| u.amount.coin())
    }

    /// Refreshed UTxOs and protocol parameters.
    async fn prepare(&mut self) -> Result<ProtocolParams> {
        self.refresh().await?;
        self.params
            .clone()
            .ok_or_else(|| Error::Config("protocol parameters not loaded".to_string()))
    }

    fn account(&self) -> OrderAccount<'_> {
        OrderAccount {
            address: &self.address,
            network: self.network,
            utxos: &self.utxos,
            collateral: self.collateral(),
        }
    }

    /// Pay `output` from the wallet. The collateral UTxO is only spent when
    /// the rest of the wallet cannot cover the transaction.
    fn pay(&self, params: &ProtocolParams, output: TxOutput, lines: &[String]) -> Result<Transaction> {
        let build = |skip: Option<&Utxo>| {
            let mut builder = TxBuilder::new(params);
            builder
                .add_wallet_utxos(
                    self.utxos
                        .iter()
                        .filter(|u| skip.map_or(true, |c| !c.same_ref(u)))
                        .cloned(),
                )
                .add_output(output.clone())
                .change_address(self.address.clone())
                .message(lines);
            builder.build()
        };

        match self.collateral() {
            Some(collateral) => match build(Some(collateral)) {
                Err(e) if e.is_validation() => {
                    tracing::warn!("Spending collateral {}: {}", collateral.out_ref(), e);
                    build(None)
                }
                result => result,
            },
            None => build(None),
        }
    }

    pub async fn send_tx(&mut self, to: &Address, assets: &Assets, msg: Option<&str>) -> Result<Transaction> {
        let params = self.prepare().await?;
        let output = TxOutput::new(to.clone(), assets.clone());
        self.pay(&params, output, &message_lines("Send", msg))
    }

    /// Send 5 ADA to the wallet itself, producing a collateral UTxO.
    pub async fn make_collateral_tx(&mut self) -> Result<Transaction> {
        let params = self.prepare().await?;
        let output = TxOutput::new(self.address.clone(), Assets::lovelace(COLLATERAL_MIN));
        self.pay(&params, output, &message_lines("Create Collateral.", None))
    }

    /// Merge every UTxO into one output to self. With `keep_collateral` the
    /// current collateral UTxO is left alone.
    pub async fn consolidate_utxos_tx(&mut self, keep_collateral: bool) -> Result<Transaction> {
        let params = self.prepare().await?;
        let skip = if keep_collateral { self.collateral() } else { None };
        let inputs: Vec<Utxo> = self
            .utxos
            .iter()
            .filter(|u| skip.map_or(true, |c| !c.same_ref(u)))
            .cloned()
            .collect();
        if inputs.len() < 2 {
            return Err(Error::InvalidTransaction(format!(
                "nothing to consolidate: {} UTxO(s)",
                inputs.len()
            )));
        }

        let mut builder = TxBuilder::new(&params);
        for utxo in inputs {
            builder.add_input(utxo);
        }
        builder
            .change_address(self.address.clone())
            .message(&message_lines("Consolidate UTxOs.", None));
        builder.build()
    }

    pub async fn swap_tx(
        &mut self,
        request: &SwapRequest,
        pool: Option<&PoolSummary>,
        slippage: f64,
        msg: Option<&str>,
    ) -> Result<Transaction> {
        let params = self.prepare().await?;
        order::swap_tx(&params, self.account(), request, pool, slippage, msg)
    }

    pub async fn zap_in_tx(
        &mut self,
        assets: &Assets,
        pool: &PoolDetail,
        slippage: f64,
        msg: Option<&str>,
    ) -> Result<Transaction> {
        let params = self.prepare().await?;
        order::zap_in_tx(&params, self.account(), assets, pool, slippage, msg)
    }

    /// Cancel an open order placed by this wallet.
    pub async fn cancel_tx(&mut self, order_utxo: &Utxo, msg: Option<&str>) -> Result<Transaction> {
        let hash = order_utxo.data_hash.as_deref().ok_or_else(|| {
            Error::InvalidTransaction(format!("{} has no datum hash", order_utxo.out_ref()))
        })?;
        let datum_hex = self.api.datum_cbor(hash).await?;
        let datum = hex::decode(&datum_hex).map_err(|e| Error::Decode(format!("datum {}: {}", hash, e)))?;

        let params = self.prepare().await?;
        order::cancel_tx(&params, self.account(), order_utxo, &datum, msg)
    }

    pub fn sign(&self, tx: &mut Transaction) -> Result<()> {
        let body_hash = tx.body.hash()?;
        tx.witness_set.vkeys.push(self.keychain.sign(&body_hash));
        Ok(())
    }

    /// Submit a signed transaction, returning its id.
    pub async fn submit(&self, tx: &Transaction) -> Result<String> {
        if tx.witness_set.vkeys.is_empty() {
            return Err(Error::InvalidTransaction("transaction is not signed".to_string()));
        }
        let tx_id = self.api.submit_tx(&tx.to_cbor()?).await?;
        tracing::info!("Submitted {}", tx_id);
        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::asset::LOVELACE;
    use crate::models::pool::tests::{ada_min_pool, MIN};
    use crate::models::{OrderDatum, OrderStep};
    use crate::testing::{mainnet_params, MockChain};
    use crate::tx::builder::tests::wallet_utxo;
    use crate::tx::encode::datum_hash;
    use crate::tx::order::ORDER_ADDRESS;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PHRASE: &str = "test walk nut penalty hip pave soap entry language right filter choice";

    struct FakeKeys;

    impl Keychain for FakeKeys {
        fn payment_key_hash(&self) -> [u8; 28] {
            [3u8; 28]
        }

        fn stake_key_hash(&self) -> Option<[u8; 28]> {
            Some([4u8; 28])
        }

        fn sign(&self, body_hash: &[u8; 32]) -> VKeyWitness {
            VKeyWitness {
                vkey: vec![1u8; 32],
                signature: [body_hash.as_slice(), body_hash.as_slice()].concat(),
            }
        }
    }

    #[derive(Default)]
    struct FakeDeriver {
        generated: AtomicUsize,
    }

    impl KeyDeriver for FakeDeriver {
        fn generate_mnemonic(&self) -> Result<String> {
            self.generated.fetch_add(1, Ordering::SeqCst);
            Ok(PHRASE.to_string())
        }

        fn derive(&self, mnemonic: &str) -> Result<Box<dyn Keychain>> {
            if mnemonic != PHRASE {
                return Err(Error::Config("unknown mnemonic".to_string()));
            }
            Ok(Box::new(FakeKeys))
        }
    }

    fn temp_config(name: &str) -> Config {
        let dir: PathBuf = std::env::temp_dir().join(format!("minswap-rs-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let mut config = Config::new("proj", Network::Mainnet);
        config.wallet_dir = dir;
        config
    }

    fn open_wallet(name: &str, utxos: Vec<Utxo>) -> (Wallet, Arc<MockChain>) {
        let chain = Arc::new(MockChain::default());
        let config = temp_config(name);
        let wallet = Wallet::open(&config, chain.clone(), &FakeDeriver::default()).unwrap();
        chain.set_utxos(&wallet.address().to_string(), utxos);
        (wallet, chain)
    }

    #[test]
    fn test_open_creates_then_reuses_mnemonic() {
        let config = temp_config("open");
        let chain = Arc::new(MockChain::default());
        let deriver = FakeDeriver::default();

        let first = Wallet::open(&config, chain.clone(), &deriver).unwrap();
        assert_eq!(deriver.generated.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_to_string(config.mnemonic_path()).unwrap(), PHRASE);

        let second = Wallet::open(&config, chain, &deriver).unwrap();
        assert_eq!(deriver.generated.load(Ordering::SeqCst), 1);
        assert_eq!(first.address(), second.address());
        assert_eq!(first.address().payment, Credential::Key([3u8; 28]));
        let _ = fs::remove_dir_all(&config.wallet_dir);
    }

    #[tokio::test]
    async fn test_collateral_selection() {
        let mut with_token = Assets::lovelace(8_000_000);
        with_token.insert(MIN, 5);
        let (mut wallet, _) = open_wallet(
            "collateral",
            vec![
                wallet_utxo(1, Assets::lovelace(3_000_000)),
                wallet_utxo(2, Assets::lovelace(30_000_000)),
                wallet_utxo(3, with_token),
                wallet_utxo(4, Assets::lovelace(12_000_000)),
                wallet_utxo(5, Assets::lovelace(6_000_000)),
            ],
        );
        assert!(wallet.collateral().is_none());
        wallet.refresh().await.unwrap();
        assert_eq!(wallet.collateral().unwrap().tx_hash, "05".repeat(32));
        assert_eq!(wallet.balance().unwrap().coin(), 59_000_000);
    }

    #[tokio::test]
    async fn test_make_collateral() {
        let (mut wallet, _) = open_wallet("make-collateral", vec![wallet_utxo(1, Assets::lovelace(50_000_000))]);
        let tx = wallet.make_collateral_tx().await.unwrap();
        let to_self = &tx.body.outputs[0];
        assert_eq!(&to_self.address, wallet.address());
        assert_eq!(to_self.amount, Assets::lovelace(COLLATERAL_MIN));
        assert!(tx.body.collateral.is_empty());
    }

    #[tokio::test]
    async fn test_params_follow_the_epoch() {
        let (mut wallet, chain) = open_wallet("params-current", vec![wallet_utxo(1, Assets::lovelace(50_000_000))]);
        let mut params = mainnet_params();
        params.epoch = Network::Mainnet.epoch_at(now_secs());
        chain.set_params(params.clone());
        wallet.refresh().await.unwrap();
        wallet.refresh().await.unwrap();
        // Two UTxO reads, one parameter read.
        assert_eq!(chain.calls(), 3);

        let (mut wallet, chain) = open_wallet("params-stale", vec![wallet_utxo(1, Assets::lovelace(50_000_000))]);
        params.epoch -= 1;
        chain.set_params(params);
        wallet.refresh().await.unwrap();
        wallet.refresh().await.unwrap();
        assert_eq!(chain.calls(), 4);
    }

    fn other_address() -> Address {
        Address::new(Network::Mainnet, Credential::Key([9u8; 28]), None)
    }

    fn spends(tx: &Transaction, n: u8) -> bool {
        let hash = format!("{:02x}", n).repeat(32);
        tx.body.inputs.iter().any(|i| i.tx_hash == hash)
    }

    #[tokio::test]
    async fn test_send_leaves_collateral_alone() {
        let (mut wallet, _) = open_wallet(
            "send-spare",
            vec![
                wallet_utxo(1, Assets::lovelace(6_000_000)),
                wallet_utxo(2, Assets::lovelace(4_000_000)),
                wallet_utxo(3, Assets::lovelace(4_000_000)),
            ],
        );
        let tx = wallet
            .send_tx(&other_address(), &Assets::lovelace(5_000_000), None)
            .await
            .unwrap();
        assert!(!spends(&tx, 1));
        assert!(spends(&tx, 2) && spends(&tx, 3));

        let tx = wallet.make_collateral_tx().await.unwrap();
        assert!(!spends(&tx, 1));
    }

    #[tokio::test]
    async fn test_send_spends_collateral_when_needed() {
        let (mut wallet, _) = open_wallet(
            "send-fallback",
            vec![
                wallet_utxo(1, Assets::lovelace(6_000_000)),
                wallet_utxo(2, Assets::lovelace(3_000_000)),
            ],
        );
        let tx = wallet
            .send_tx(&other_address(), &Assets::lovelace(4_000_000), None)
            .await
            .unwrap();
        assert!(spends(&tx, 1));
        assert_eq!(tx.body.outputs[0].amount, Assets::lovelace(4_000_000));
    }

    #[tokio::test]
    async fn test_consolidate() {
        let (mut wallet, _) = open_wallet(
            "consolidate",
            vec![
                wallet_utxo(1, Assets::lovelace(30_000_000)),
                wallet_utxo(2, Assets::single(LOVELACE, 40_000_000)),
                wallet_utxo(3, Assets::lovelace(6_000_000)),
            ],
        );
        let tx = wallet.consolidate_utxos_tx(true).await.unwrap();
        assert_eq!(tx.body.inputs.len(), 2);
        assert_eq!(tx.body.outputs.len(), 1);
        assert_eq!(tx.body.outputs[0].amount.coin() + tx.body.fee, 70_000_000);

        let tx = wallet.consolidate_utxos_tx(false).await.unwrap();
        assert_eq!(tx.body.inputs.len(), 3);
    }

    #[tokio::test]
    async fn test_consolidate_needs_two_inputs() {
        let (mut wallet, _) = open_wallet(
            "consolidate-one",
            vec![
                wallet_utxo(1, Assets::lovelace(30_000_000)),
                wallet_utxo(3, Assets::lovelace(6_000_000)),
            ],
        );
        assert!(matches!(
            wallet.consolidate_utxos_tx(true).await,
            Err(Error::InvalidTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_swap_sign_and_submit() {
        let (mut wallet, chain) = open_wallet("swap", vec![wallet_utxo(1, Assets::lovelace(100_000_000))]);
        let pool = ada_min_pool();
        let mut tx = wallet
            .swap_tx(
                &SwapRequest::ExactIn(Assets::lovelace(10_000_000)),
                Some(&pool),
                order::DEFAULT_SLIPPAGE,
                Some("test"),
            )
            .await
            .unwrap();

        assert!(matches!(
            wallet.submit(&tx).await,
            Err(Error::InvalidTransaction(_))
        ));
        wallet.sign(&mut tx).unwrap();
        assert_eq!(tx.witness_set.vkeys.len(), 1);
        let tx_id = wallet.submit(&tx).await.unwrap();
        assert_eq!(chain.submitted().len(), 1);
        assert_eq!(tx_id.len(), 64);
    }

    #[tokio::test]
    async fn test_cancel_own_order() {
        let (mut wallet, chain) = open_wallet(
            "cancel",
            vec![
                wallet_utxo(1, Assets::lovelace(30_000_000)),
                wallet_utxo(2, Assets::lovelace(6_000_000)),
            ],
        );
        let datum = OrderDatum::new(
            wallet.address(),
            OrderStep::SwapExactIn {
                desired_unit: MIN.to_string(),
                min_receive: 10,
            },
        );
        let cbor = datum.to_cbor().unwrap();
        let hash = hex::encode(datum_hash(&cbor));
        chain.add_datum(&hash, &hex::encode(&cbor));

        let mut order = wallet_utxo(9, Assets::lovelace(14_000_000));
        order.address = ORDER_ADDRESS.to_string();
        order.data_hash = Some(hash);

        let tx = wallet.cancel_tx(&order, None).await.unwrap();
        assert_eq!(tx.body.collateral.len(), 1);
        assert_eq!(tx.body.collateral[0].tx_hash, "02".repeat(32));
        assert_eq!(tx.witness_set.plutus_data, vec![cbor]);
    }

    #[tokio::test]
    async fn test_cancel_without_collateral() {
        let (mut wallet, chain) = open_wallet("cancel-no-collateral", vec![wallet_utxo(1, Assets::lovelace(30_000_000))]);
        let datum = OrderDatum::new(
            wallet.address(),
            OrderStep::Withdraw { min_a: 1, min_b: 1 },
        );
        let cbor = datum.to_cbor().unwrap();
        let hash = hex::encode(datum_hash(&cbor));
        chain.add_datum(&hash, &hex::encode(&cbor));

        let mut order = wallet_utxo(9, Assets::lovelace(14_000_000));
        order.data_hash = Some(hash);
        assert!(matches!(
            wallet.cancel_tx(&order, None).await,
            Err(Error::MissingCollateral)
        ));
    }
}
