//! Input selection, change and fee balancing.

use ciborium::value::Value;

use crate::dex::cbor::encode_cbor;
use crate::error::{Error, Result};
use crate::models::asset::LOVELACE;
use crate::models::{Address, Assets, ProtocolParams, Utxo};
use crate::tx::encode::{
    blake2b_256, message_metadata, ExUnits, Redeemer, Transaction, TxBody, TxInput, TxOutput,
    VKeyWitness, WitnessSet,
};

fn tx_input(utxo: &Utxo) -> TxInput {
    TxInput {
        tx_hash: utxo.tx_hash.clone(),
        index: utxo.output_index,
    }
}

enum Balance {
    Ready(Transaction),
    /// Not enough lovelace selected to pay outputs, fee and change.
    Short { required: u64, available: u64 },
    /// Change exists but is below its min-ADA.
    DustChange { change: u64, min_ada: u64 },
}

/// Builds an unsigned transaction.
///
/// Explicit inputs are always spent. Wallet UTxOs added with
/// [`TxBuilder::add_wallet_utxos`] are candidates, picked largest-first until
/// outputs, fee and change are covered.
pub struct TxBuilder<'a> {
    params: &'a ProtocolParams,
    inputs: Vec<Utxo>,
    candidates: Vec<Utxo>,
    outputs: Vec<TxOutput>,
    change_address: Option<Address>,
    collateral: Vec<Utxo>,
    required_signers: Vec<[u8; 28]>,
    scripts: Vec<Vec<u8>>,
    datums: Vec<Vec<u8>>,
    spend_redeemers: Vec<(TxInput, Value, ExUnits)>,
    metadata: Option<Value>,
    vkey_witnesses: usize,
}

impl<'a> TxBuilder<'a> {
    pub fn new(params: &'a ProtocolParams) -> Self {
        Self {
            params,
            inputs: Vec::new(),
            candidates: Vec::new(),
            outputs: Vec::new(),
            change_address: None,
            collateral: Vec::new(),
            required_signers: Vec::new(),
            scripts: Vec::new(),
            datums: Vec::new(),
            spend_redeemers: Vec::new(),
            metadata: None,
            vkey_witnesses: 1,
        }
    }

    pub fn add_input(&mut self, utxo: Utxo) -> &mut Self {
        self.inputs.push(utxo);
        self
    }

    pub fn add_wallet_utxos(&mut self, utxos: impl IntoIterator<Item = Utxo>) -> &mut Self {
        self.candidates.extend(utxos);
        self
    }

    pub fn add_output(&mut self, output: TxOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn change_address(&mut self, address: Address) -> &mut Self {
        self.change_address = Some(address);
        self
    }

    pub fn add_collateral(&mut self, utxo: Utxo) -> &mut Self {
        self.collateral.push(utxo);
        self
    }

    pub fn add_required_signer(&mut self, key_hash: [u8; 28]) -> &mut Self {
        self.required_signers.push(key_hash);
        self
    }

    pub fn add_plutus_v1_script(&mut self, script: Vec<u8>) -> &mut Self {
        self.scripts.push(script);
        self
    }

    /// Witness a datum given as its CBOR bytes.
    pub fn add_datum(&mut self, datum_cbor: Vec<u8>) -> &mut Self {
        self.datums.push(datum_cbor);
        self
    }

    /// Spend a script-locked UTxO with `redeemer`.
    pub fn add_script_input(&mut self, utxo: Utxo, redeemer: Value, ex_units: ExUnits) -> &mut Self {
        self.spend_redeemers.push((tx_input(&utxo), redeemer, ex_units));
        self.inputs.push(utxo);
        self
    }

    /// CIP-20 message lines.
    pub fn message(&mut self, lines: &[String]) -> &mut Self {
        self.metadata = Some(message_metadata(lines));
        self
    }

    pub fn build(&self) -> Result<Transaction> {
        let change_address = self
            .change_address
            .clone()
            .ok_or_else(|| Error::InvalidTransaction("no change address set".to_string()))?;

        for output in &self.outputs {
            let min_ada = output.min_ada(self.params.coins_per_utxo_size)?;
            if output.amount.coin() < min_ada {
                return Err(Error::InvalidTransaction(format!(
                    "output to {} carries {} lovelace, below the {} minimum",
                    output.address,
                    output.amount.coin(),
                    min_ada
                )));
            }
        }
        if !self.spend_redeemers.is_empty() && self.collateral.is_empty() {
            return Err(Error::MissingCollateral);
        }

        let mut required = Assets::new();
        for output in &self.outputs {
            required = required.checked_add(&output.amount)?;
        }

        let mut selected = self.inputs.clone();
        let mut pool: Vec<Utxo> = self
            .candidates
            .iter()
            .filter(|c| {
                !selected.iter().any(|s| s.same_ref(c))
                    && !self.collateral.iter().any(|s| s.same_ref(c))
            })
            .cloned()
            .collect();

        self.select_native_assets(&required, &mut selected, &mut pool)?;

        // Largest lovelace last, so `pop` takes it.
        pool.sort_by_key(|u| u.amount.coin());

        let mut fee = 0u64;
        loop {
            match self.assemble(&selected, &required, fee, &change_address)? {
                Balance::Ready(tx) => {
                    let needed = self.min_fee(&tx)?;
                    if needed <= fee {
                        return self.finish(tx);
                    }
                    fee = needed;
                }
                Balance::Short {
                    required,
                    available,
                } => match pool.pop() {
                    Some(utxo) => selected.push(utxo),
                    None => return Err(Error::insufficient(LOVELACE, required, available)),
                },
                Balance::DustChange { change, min_ada } => match pool.pop() {
                    Some(utxo) => selected.push(utxo),
                    None => {
                        return Err(Error::InvalidTransaction(format!(
                            "change of {} lovelace is below the {} minimum",
                            change, min_ada
                        )))
                    }
                },
            }
        }
    }

    /// Cover every native asset in `required`, taking the UTxO holding the
    /// most of a unit first.
    fn select_native_assets(
        &self,
        required: &Assets,
        selected: &mut Vec<Utxo>,
        pool: &mut Vec<Utxo>,
    ) -> Result<()> {
        for (unit, need) in required.iter().filter(|(u, _)| *u != LOVELACE) {
            loop {
                let have: u64 = selected.iter().map(|u| u.amount.quantity(unit)).sum();
                if have >= need {
                    break;
                }
                let best = pool
                    .iter()
                    .enumerate()
                    .filter(|(_, u)| u.has_asset(unit))
                    .max_by_key(|(_, u)| u.amount.quantity(unit))
                    .map(|(i, _)| i);
                match best {
                    Some(i) => selected.push(pool.swap_remove(i)),
                    None => return Err(Error::insufficient(unit, need, have)),
                }
            }
        }
        Ok(())
    }

    fn assemble(
        &self,
        selected: &[Utxo],
        required: &Assets,
        fee: u64,
        change_address: &Address,
    ) -> Result<Balance> {
        let mut provided = Assets::new();
        for utxo in selected {
            provided = provided.checked_add(&utxo.amount)?;
        }

        let spent = required.checked_add(&Assets::lovelace(fee))?;
        let change = match provided.checked_sub(&spent) {
            Ok(change) => change,
            Err(Error::InsufficientFunds {
                unit,
                required,
                available,
            }) if unit == LOVELACE => return Ok(Balance::Short { required, available }),
            Err(e) => return Err(e),
        };

        let mut outputs = self.outputs.clone();
        if !change.is_empty() {
            let change_output = TxOutput::new(change_address.clone(), change);
            let min_ada = change_output.min_ada(self.params.coins_per_utxo_size)?;
            if change_output.amount.coin() < min_ada {
                return Ok(Balance::DustChange {
                    change: change_output.amount.coin(),
                    min_ada,
                });
            }
            outputs.push(change_output);
        }

        let mut inputs: Vec<TxInput> = selected.iter().map(tx_input).collect();
        inputs.sort();

        let mut redeemers = Vec::with_capacity(self.spend_redeemers.len());
        for (input, data, ex_units) in &self.spend_redeemers {
            let index = inputs.iter().position(|i| i == input).ok_or_else(|| {
                Error::InvalidTransaction(format!("redeemer for unspent input {:?}", input))
            })?;
            redeemers.push(Redeemer {
                index: index as u32,
                data: data.clone(),
                ex_units: *ex_units,
            });
        }

        let witness_set = WitnessSet {
            vkeys: Vec::new(),
            plutus_v1_scripts: self.scripts.clone(),
            plutus_data: self.datums.clone(),
            redeemers,
        };
        let script_data_hash = witness_set
            .script_data_hash(self.params.plutus_v1_cost_model().map(|c| c.as_slice()))?;
        let auxiliary_data_hash = match &self.metadata {
            Some(m) => Some(blake2b_256(&encode_cbor(m)?)),
            None => None,
        };

        let body = TxBody {
            inputs,
            outputs,
            fee,
            auxiliary_data_hash,
            script_data_hash,
            collateral: self.collateral.iter().map(tx_input).collect(),
            required_signers: self.required_signers.clone(),
        };

        Ok(Balance::Ready(Transaction {
            body,
            witness_set,
            auxiliary_data: self.metadata.clone(),
        }))
    }

    /// Transaction with placeholder signatures, sized like the signed one.
    fn with_dummy_witnesses(&self, tx: &Transaction) -> Transaction {
        let mut signed = tx.clone();
        signed.witness_set.vkeys = (0..self.vkey_witnesses)
            .map(|_| VKeyWitness {
                vkey: vec![0u8; 32],
                signature: vec![0u8; 64],
            })
            .collect();
        signed
    }

    fn min_fee(&self, tx: &Transaction) -> Result<u64> {
        let size = self.with_dummy_witnesses(tx).size()? as u64;
        let script_fee: f64 = tx
            .witness_set
            .redeemers
            .iter()
            .map(|r| {
                self.params.price_mem * r.ex_units.mem as f64
                    + self.params.price_step * r.ex_units.steps as f64
            })
            .sum();
        Ok(self.params.min_fee_a * size + self.params.min_fee_b + script_fee.ceil() as u64)
    }

    fn finish(&self, tx: Transaction) -> Result<Transaction> {
        let size = self.with_dummy_witnesses(&tx).size()? as u64;
        if size > self.params.max_tx_size {
            return Err(Error::InvalidTransaction(format!(
                "transaction is {} bytes, the limit is {}",
                size, self.params.max_tx_size
            )));
        }

        if !tx.witness_set.redeemers.is_empty() {
            let percent = self.params.collateral_percent.unwrap_or(150);
            let required = (tx.body.fee * percent).div_ceil(100);
            let available: u64 = self.collateral.iter().map(|u| u.amount.coin()).sum();
            if available < required {
                return Err(Error::InvalidTransaction(format!(
                    "collateral of {} lovelace does not cover {} required",
                    available, required
                )));
            }
        }

        tracing::debug!(
            "Built transaction: {} inputs, {} outputs, fee {}, {} bytes",
            tx.body.inputs.len(),
            tx.body.outputs.len(),
            tx.body.fee,
            size
        );
        Ok(tx)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Credential;
    use crate::testing::mainnet_params;

    pub const MIN: &str = "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e";

    pub fn wallet_address() -> Address {
        Address::new(
            crate::config::Network::Mainnet,
            Credential::Key([3u8; 28]),
            Some(Credential::Key([4u8; 28])),
        )
    }

    pub fn wallet_utxo(n: u8, amount: Assets) -> Utxo {
        Utxo {
            address: wallet_address().to_string(),
            tx_hash: format!("{:02x}", n).repeat(32),
            output_index: 0,
            amount,
            block: String::new(),
            data_hash: None,
            inline_datum: None,
            reference_script_hash: None,
        }
    }

    fn balance_of(tx: &Transaction, inputs: &[Utxo]) -> (Assets, Assets) {
        let mut ins = Assets::new();
        for input in &tx.body.inputs {
            let utxo = inputs
                .iter()
                .find(|u| u.tx_hash == input.tx_hash && u.output_index == input.index)
                .unwrap();
            ins += utxo.amount.clone();
        }
        let mut outs = Assets::lovelace(tx.body.fee);
        for o in &tx.body.outputs {
            outs += o.amount.clone();
        }
        (ins, outs)
    }

    #[test]
    fn test_simple_send_balances() {
        let params = mainnet_params();
        let utxos = vec![
            wallet_utxo(1, Assets::lovelace(3_000_000)),
            wallet_utxo(2, Assets::lovelace(50_000_000)),
            wallet_utxo(3, Assets::lovelace(10_000_000)),
        ];
        let mut builder = TxBuilder::new(&params);
        builder
            .add_wallet_utxos(utxos.clone())
            .add_output(TxOutput::new(wallet_address(), Assets::lovelace(20_000_000)))
            .change_address(wallet_address())
            .message(&["Send".to_string()]);
        let tx = builder.build().unwrap();

        // Largest-first: the 50 ADA UTxO alone is enough.
        assert_eq!(tx.body.inputs.len(), 1);
        assert_eq!(tx.body.inputs[0].tx_hash, "02".repeat(32));
        assert_eq!(tx.body.outputs.len(), 2);
        assert!(tx.body.auxiliary_data_hash.is_some());

        let (ins, outs) = balance_of(&tx, &utxos);
        assert_eq!(ins, outs);

        // Fee has settled at the minimum for the signed size.
        let signed = builder.with_dummy_witnesses(&tx);
        let expected = params.min_fee_a * signed.size().unwrap() as u64 + params.min_fee_b;
        assert!(tx.body.fee >= expected);
        assert!(tx.body.fee - expected < params.min_fee_a * 4);
    }

    #[test]
    fn test_native_assets_selected() {
        let params = mainnet_params();
        let mut with_min = Assets::lovelace(2_000_000);
        with_min.insert(MIN, 500);
        let utxos = vec![
            wallet_utxo(1, Assets::lovelace(100_000_000)),
            wallet_utxo(2, with_min),
        ];
        let mut out = Assets::lovelace(2_000_000);
        out.insert(MIN, 200);

        let mut builder = TxBuilder::new(&params);
        builder
            .add_wallet_utxos(utxos.clone())
            .add_output(TxOutput::new(wallet_address(), out))
            .change_address(wallet_address());
        let tx = builder.build().unwrap();

        let (ins, outs) = balance_of(&tx, &utxos);
        assert_eq!(ins, outs);
        let change = tx.body.outputs.last().unwrap();
        assert_eq!(change.amount.quantity(MIN), 300);
    }

    #[test]
    fn test_insufficient_funds() {
        let params = mainnet_params();
        let mut builder = TxBuilder::new(&params);
        builder
            .add_wallet_utxos(vec![wallet_utxo(1, Assets::lovelace(5_000_000))])
            .add_output(TxOutput::new(wallet_address(), Assets::lovelace(10_000_000)))
            .change_address(wallet_address());
        assert!(matches!(
            builder.build(),
            Err(Error::InsufficientFunds { ref unit, .. }) if unit == LOVELACE
        ));

        let mut builder = TxBuilder::new(&params);
        let mut out = Assets::lovelace(2_000_000);
        out.insert(MIN, 1);
        builder
            .add_wallet_utxos(vec![wallet_utxo(1, Assets::lovelace(50_000_000))])
            .add_output(TxOutput::new(wallet_address(), out))
            .change_address(wallet_address());
        assert!(matches!(
            builder.build(),
            Err(Error::InsufficientFunds { ref unit, .. }) if unit == MIN
        ));
    }

    #[test]
    fn test_output_below_min_ada_is_rejected() {
        let params = mainnet_params();
        let mut builder = TxBuilder::new(&params);
        builder
            .add_wallet_utxos(vec![wallet_utxo(1, Assets::lovelace(50_000_000))])
            .add_output(TxOutput::new(wallet_address(), Assets::lovelace(100_000)))
            .change_address(wallet_address());
        assert!(matches!(builder.build(), Err(Error::InvalidTransaction(_))));
    }

    #[test]
    fn test_malformed_unit_fails_before_submission() {
        let params = mainnet_params();
        let mut out = Assets::lovelace(5_000_000);
        out.insert("abcd", 5);
        let mut builder = TxBuilder::new(&params);
        builder
            .add_wallet_utxos(vec![wallet_utxo(1, Assets::lovelace(50_000_000))])
            .add_output(TxOutput::new(wallet_address(), out))
            .change_address(wallet_address());
        assert!(matches!(builder.build(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_dust_change_is_rejected() {
        let params = mainnet_params();
        let mut builder = TxBuilder::new(&params);
        // Leaves roughly 0.3 ADA of change after the fee.
        builder
            .add_wallet_utxos(vec![wallet_utxo(1, Assets::lovelace(5_500_000))])
            .add_output(TxOutput::new(wallet_address(), Assets::lovelace(5_000_000)))
            .change_address(wallet_address());
        assert!(matches!(builder.build(), Err(Error::InvalidTransaction(_))));
    }

    #[test]
    fn test_script_spend_needs_collateral() {
        let params = mainnet_params();
        let order = wallet_utxo(9, Assets::lovelace(10_000_000));
        let mut builder = TxBuilder::new(&params);
        builder
            .add_script_input(
                order,
                crate::dex::cbor::constr(1, vec![]),
                ExUnits { mem: 1_000_000, steps: 400_000_000 },
            )
            .change_address(wallet_address());
        assert!(matches!(builder.build(), Err(Error::MissingCollateral)));
    }

    #[test]
    fn test_consolidation_has_single_output() {
        let params = mainnet_params();
        let mut builder = TxBuilder::new(&params);
        for n in 1..=4 {
            builder.add_input(wallet_utxo(n, Assets::lovelace(2_000_000)));
        }
        builder.change_address(wallet_address());
        let tx = builder.build().unwrap();
        assert_eq!(tx.body.inputs.len(), 4);
        assert_eq!(tx.body.outputs.len(), 1);
        assert_eq!(tx.body.outputs[0].amount.coin() + tx.body.fee, 8_000_000);
    }
}
