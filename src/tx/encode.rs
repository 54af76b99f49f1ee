//! Alonzo-era transaction model and its CBOR encoding.
//!
//! Only the fields the order flows need are modelled: legacy array outputs
//! with an optional datum hash, PlutusV1 scripts, and spend redeemers.

use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};
use ciborium::value::Value;

use crate::dex::cbor::{bytes, encode_cbor, int};
use crate::error::{Error, Result};
use crate::models::{Address, Assets};

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn blake2b_224(data: &[u8]) -> [u8; 28] {
    let mut hasher = Blake2b::<U28>::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of a Plutus datum: Blake2b-256 over its CBOR bytes.
pub fn datum_hash(datum_cbor: &[u8]) -> [u8; 32] {
    blake2b_256(datum_cbor)
}

/// Script hash of a PlutusV1 script (language tag `0x01` prefixed).
pub fn plutus_v1_script_hash(script: &[u8]) -> [u8; 28] {
    let mut tagged = Vec::with_capacity(script.len() + 1);
    tagged.push(0x01);
    tagged.extend_from_slice(script);
    blake2b_224(&tagged)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxInput {
    pub tx_hash: String,
    pub index: u32,
}

impl TxInput {
    fn to_cbor(&self) -> Result<Value> {
        let hash = hex::decode(&self.tx_hash)
            .map_err(|e| Error::Decode(format!("invalid tx hash {}: {}", self.tx_hash, e)))?;
        Ok(Value::Array(vec![bytes(&hash), int(self.index as u64)]))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    pub address: Address,
    pub amount: Assets,
    pub datum_hash: Option<[u8; 32]>,
}

impl TxOutput {
    pub fn new(address: Address, amount: Assets) -> Self {
        Self {
            address,
            amount,
            datum_hash: None,
        }
    }

    pub fn with_datum_hash(mut self, hash: [u8; 32]) -> Self {
        self.datum_hash = Some(hash);
        self
    }

    fn to_cbor(&self) -> Result<Value> {
        let mut fields = vec![
            bytes(self.address.to_bytes()),
            value_to_cbor(&self.amount)?,
        ];
        if let Some(h) = &self.datum_hash {
            fields.push(bytes(h));
        }
        Ok(Value::Array(fields))
    }

    pub fn size(&self) -> Result<usize> {
        Ok(encode_cbor(&self.to_cbor()?)?.len())
    }

    /// Minimum lovelace this output must carry: `(160 + size) * coins_per_byte`.
    ///
    /// The size is measured with the coin field at its widest so that raising
    /// the coin to the minimum can never push the requirement higher.
    pub fn min_ada(&self, coins_per_utxo_size: u64) -> Result<u64> {
        let mut widest = self.clone();
        widest.amount.insert(crate::models::asset::LOVELACE, u64::MAX);
        Ok((160 + widest.size()? as u64) * coins_per_utxo_size)
    }
}

/// `coin` or `[coin, { policy => { name => qty } }]`.
fn value_to_cbor(amount: &Assets) -> Result<Value> {
    let coin = int(amount.coin());
    let multi = amount.multi_asset()?;
    if multi.is_empty() {
        return Ok(coin);
    }
    let mut policies = Vec::with_capacity(multi.len());
    for (policy, names) in multi {
        let policy = hex::decode(&policy)
            .map_err(|e| Error::Decode(format!("invalid policy id {}: {}", policy, e)))?;
        let mut entries = Vec::with_capacity(names.len());
        for (name, qty) in names {
            let name = hex::decode(&name)
                .map_err(|e| Error::Decode(format!("invalid asset name {}: {}", name, e)))?;
            entries.push((bytes(&name), int(qty)));
        }
        policies.push((bytes(&policy), Value::Map(entries)));
    }
    Ok(Value::Array(vec![coin, Value::Map(policies)]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redeemer {
    /// Index of the spent input in the sorted input set.
    pub index: u32,
    pub data: Value,
    pub ex_units: ExUnits,
}

impl Redeemer {
    fn to_cbor(&self) -> Value {
        Value::Array(vec![
            int(0), // spend
            int(self.index as u64),
            self.data.clone(),
            Value::Array(vec![int(self.ex_units.mem), int(self.ex_units.steps)]),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TxBody {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    pub auxiliary_data_hash: Option<[u8; 32]>,
    pub script_data_hash: Option<[u8; 32]>,
    pub collateral: Vec<TxInput>,
    pub required_signers: Vec<[u8; 28]>,
}

impl TxBody {
    pub fn to_cbor(&self) -> Result<Value> {
        let inputs = self
            .inputs
            .iter()
            .map(TxInput::to_cbor)
            .collect::<Result<Vec<_>>>()?;
        let outputs = self
            .outputs
            .iter()
            .map(TxOutput::to_cbor)
            .collect::<Result<Vec<_>>>()?;

        let mut map = vec![
            (int(0), Value::Array(inputs)),
            (int(1), Value::Array(outputs)),
            (int(2), int(self.fee)),
        ];
        if let Some(h) = &self.auxiliary_data_hash {
            map.push((int(7), bytes(h)));
        }
        if let Some(h) = &self.script_data_hash {
            map.push((int(11), bytes(h)));
        }
        if !self.collateral.is_empty() {
            let collateral = self
                .collateral
                .iter()
                .map(TxInput::to_cbor)
                .collect::<Result<Vec<_>>>()?;
            map.push((int(13), Value::Array(collateral)));
        }
        if !self.required_signers.is_empty() {
            let signers = self.required_signers.iter().map(|s| bytes(s)).collect();
            map.push((int(14), Value::Array(signers)));
        }
        Ok(Value::Map(map))
    }

    /// Transaction id.
    pub fn hash(&self) -> Result<[u8; 32]> {
        Ok(blake2b_256(&encode_cbor(&self.to_cbor()?)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VKeyWitness {
    pub vkey: Vec<u8>,
    pub signature: Vec<u8>,
}

/// CBOR head for a definite-length array or map (`major` 4 or 5).
fn container_head(major: u8, len: usize) -> Vec<u8> {
    let m = major << 5;
    match len {
        0..=23 => vec![m | len as u8],
        24..=0xff => vec![m | 24, len as u8],
        _ => {
            let mut head = vec![m | 25];
            head.extend_from_slice(&(len as u16).to_be_bytes());
            head
        }
    }
}

fn raw_array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = container_head(4, items.len());
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WitnessSet {
    pub vkeys: Vec<VKeyWitness>,
    pub plutus_v1_scripts: Vec<Vec<u8>>,
    /// Datums as their original CBOR bytes. Re-encoding a decoded datum can
    /// change its bytes (and so its hash), so they are carried verbatim.
    pub plutus_data: Vec<Vec<u8>>,
    pub redeemers: Vec<Redeemer>,
}

impl WitnessSet {
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut entries: Vec<Vec<u8>> = Vec::new();
        if !self.vkeys.is_empty() {
            let vkeys = self
                .vkeys
                .iter()
                .map(|w| Value::Array(vec![bytes(&w.vkey), bytes(&w.signature)]))
                .collect();
            entries.push(encode_cbor(&int(0))?);
            entries.push(encode_cbor(&Value::Array(vkeys))?);
        }
        if !self.plutus_v1_scripts.is_empty() {
            let scripts = self.plutus_v1_scripts.iter().map(|s| bytes(s)).collect();
            entries.push(encode_cbor(&int(3))?);
            entries.push(encode_cbor(&Value::Array(scripts))?);
        }
        if !self.plutus_data.is_empty() {
            entries.push(encode_cbor(&int(4))?);
            entries.push(raw_array(&self.plutus_data));
        }
        if !self.redeemers.is_empty() {
            entries.push(encode_cbor(&int(5))?);
            entries.push(encode_cbor(&self.redeemers_cbor())?);
        }

        let mut out = container_head(5, entries.len() / 2);
        for entry in entries {
            out.extend(entry);
        }
        Ok(out)
    }

    fn redeemers_cbor(&self) -> Value {
        Value::Array(self.redeemers.iter().map(Redeemer::to_cbor).collect())
    }

    /// `blake2b_256(redeemers || datums || language views)`; `None` when the
    /// transaction carries neither redeemers nor datums.
    pub fn script_data_hash(&self, cost_model: Option<&[i64]>) -> Result<Option<[u8; 32]>> {
        if self.redeemers.is_empty() && self.plutus_data.is_empty() {
            return Ok(None);
        }
        let mut preimage = encode_cbor(&self.redeemers_cbor())?;
        if !self.plutus_data.is_empty() {
            preimage.extend(raw_array(&self.plutus_data));
        }
        if self.redeemers.is_empty() {
            // Datums only: empty language views.
            preimage.push(0xa0);
        } else {
            let cost_model = cost_model.ok_or_else(|| {
                Error::InvalidTransaction("PlutusV1 cost model is unavailable".to_string())
            })?;
            preimage.extend(plutus_v1_language_views(cost_model)?);
        }
        Ok(Some(blake2b_256(&preimage)))
    }
}

/// PlutusV1 language views keep the legacy double encoding: the language id
/// and the indefinite-length cost list are both wrapped in byte strings.
fn plutus_v1_language_views(cost_model: &[i64]) -> Result<Vec<u8>> {
    let mut costs = vec![0x9f];
    for c in cost_model {
        costs.extend(encode_cbor(&Value::Integer((*c).into()))?);
    }
    costs.push(0xff);
    encode_cbor(&Value::Map(vec![(bytes(&[0x00]), Value::Bytes(costs))]))
}

/// CIP-20 message metadata: `{ 674: { "msg": [line, ...] } }`, each line at
/// most 64 bytes.
pub fn message_metadata(lines: &[String]) -> Value {
    let mut chunks = Vec::new();
    for line in lines {
        let mut rest = line.as_str();
        while rest.len() > 64 {
            let mut cut = 64;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            chunks.push(Value::Text(rest[..cut].to_string()));
            rest = &rest[cut..];
        }
        chunks.push(Value::Text(rest.to_string()));
    }
    Value::Map(vec![(
        int(674),
        Value::Map(vec![(Value::Text("msg".to_string()), Value::Array(chunks))]),
    )])
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub body: TxBody,
    pub witness_set: WitnessSet,
    pub auxiliary_data: Option<Value>,
}

impl Transaction {
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut out = container_head(4, 4);
        out.extend(encode_cbor(&self.body.to_cbor()?)?);
        out.extend(self.witness_set.to_cbor()?);
        out.extend(encode_cbor(&Value::Bool(true))?);
        out.extend(encode_cbor(
            self.auxiliary_data.as_ref().unwrap_or(&Value::Null),
        )?);
        Ok(out)
    }

    pub fn id(&self) -> Result<String> {
        self.body.hash().map(hex::encode)
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.to_cbor()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::cbor::{constr, decode_cbor_bytes};

    const ORDER: &str = "addr1wxn9efv2f6w82hagxqtn62ju4m293tqvw0uhmdl64ch8uwc0h43gt";
    const MIN: &str = "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e";

    #[test]
    fn test_blake2b() {
        assert_eq!(
            hex::encode(blake2b_256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
        assert_eq!(blake2b_224(b"abc").len(), 28);
    }

    #[test]
    fn test_output_encoding() {
        let address = Address::from_bech32(ORDER).unwrap();
        let out = TxOutput::new(address.clone(), Assets::lovelace(2_000_000));
        let value = decode_cbor_bytes(&encode_cbor(&out.to_cbor().unwrap()).unwrap()).unwrap();
        match value {
            Value::Array(fields) => {
                assert_eq!(fields.len(), 2);
                assert!(matches!(fields[1], Value::Integer(_)));
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut amount = Assets::lovelace(2_000_000);
        amount.insert(MIN, 10);
        let out = TxOutput::new(address, amount).with_datum_hash([1u8; 32]);
        match out.to_cbor().unwrap() {
            Value::Array(fields) => {
                assert_eq!(fields.len(), 3);
                assert!(matches!(fields[1], Value::Array(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_min_ada_grows_with_assets() {
        let address = Address::from_bech32(ORDER).unwrap();
        let plain = TxOutput::new(address.clone(), Assets::lovelace(1));
        let mut amount = Assets::lovelace(1);
        amount.insert(MIN, 10);
        let token = TxOutput::new(address, amount);

        let plain_min = plain.min_ada(4310).unwrap();
        // 29-byte address, 9-byte coin, 2 bytes of framing.
        assert_eq!(plain_min, (160 + 41) * 4310);
        assert!(token.min_ada(4310).unwrap() > plain_min);
    }

    #[test]
    fn test_script_data_hash_requires_cost_model() {
        let mut witness = WitnessSet::default();
        assert_eq!(witness.script_data_hash(None).unwrap(), None);

        witness.redeemers.push(Redeemer {
            index: 0,
            data: constr(1, vec![]),
            ex_units: ExUnits { mem: 1, steps: 1 },
        });
        assert!(matches!(
            witness.script_data_hash(None),
            Err(Error::InvalidTransaction(_))
        ));
        let a = witness.script_data_hash(Some(&[1, 2, 3])).unwrap().unwrap();
        let b = witness.script_data_hash(Some(&[1, 2, 4])).unwrap().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_raw_datums_are_kept_verbatim() {
        // Indefinite-length constr as most wallets encode it.
        let indefinite = hex::decode("d8799f01ff").unwrap();
        let witness = WitnessSet {
            plutus_data: vec![indefinite.clone()],
            ..WitnessSet::default()
        };
        let encoded = witness.to_cbor().unwrap();
        assert_eq!(hex::encode(encoded), "a10481d8799f01ff");
        assert!(witness.script_data_hash(None).unwrap().is_some());
    }

    #[test]
    fn test_container_head() {
        assert_eq!(container_head(4, 3), vec![0x83]);
        assert_eq!(container_head(5, 30), vec![0xb8, 30]);
        assert_eq!(container_head(4, 300), vec![0x99, 0x01, 0x2c]);
    }

    #[test]
    fn test_language_views_encoding() {
        // { h'00': h'9f0102ff' }
        let views = plutus_v1_language_views(&[1, 2]).unwrap();
        assert_eq!(hex::encode(views), "a14100449f0102ff");
    }

    #[test]
    fn test_message_metadata_splits_long_lines() {
        let long = "x".repeat(100);
        let meta = message_metadata(&["minswap-rs".to_string(), long]);
        let encoded = encode_cbor(&meta).unwrap();
        let decoded = decode_cbor_bytes(&encoded).unwrap();
        let Value::Map(outer) = decoded else { panic!() };
        let Value::Map(inner) = &outer[0].1 else { panic!() };
        let Value::Array(lines) = &inner[0].1 else { panic!() };
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_transaction_shape() {
        let tx = Transaction {
            body: TxBody {
                inputs: vec![TxInput {
                    tx_hash: "aa".repeat(32),
                    index: 1,
                }],
                fee: 170_000,
                ..TxBody::default()
            },
            witness_set: WitnessSet::default(),
            auxiliary_data: None,
        };
        let bytes = tx.to_cbor().unwrap();
        // 4-element array, body map with 3 entries
        assert_eq!(&bytes[..2], &[0x84, 0xa3]);
        assert_eq!(tx.id().unwrap().len(), 64);
    }
}
