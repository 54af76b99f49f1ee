/// Shared CBOR helpers for Plutus data (pool datums, order datums, redeemers).
use ciborium::value::Value;

use crate::error::{Error, Result};

fn decode_err(msg: String) -> Error {
    Error::Decode(msg)
}

/// Plutus constructor tags: 121..=127 for alternatives 0..=6, 1280.. for 7..=127.
pub fn constr_tag(index: u64) -> u64 {
    if index < 7 {
        121 + index
    } else {
        1280 + (index - 7)
    }
}

/// Build a Plutus constructor value.
pub fn constr(index: u64, fields: Vec<Value>) -> Value {
    Value::Tag(constr_tag(index), Box::new(Value::Array(fields)))
}

pub fn bytes(b: &[u8]) -> Value {
    Value::Bytes(b.to_vec())
}

pub fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

/// Extract the inner field array from a Plutus constructor tag.
pub fn constr_fields(v: &Value) -> Result<&Vec<Value>> {
    match v {
        Value::Tag(_, inner) => match inner.as_ref() {
            Value::Array(fields) => Ok(fields),
            _ => Err(decode_err("Expected array inside constr tag".to_string())),
        },
        _ => Err(decode_err(format!("Expected CBOR tag for constr, got {:?}", v))),
    }
}

/// Constructor alternative of a tagged Plutus value.
pub fn constr_index(v: &Value) -> Result<u64> {
    match v {
        Value::Tag(tag @ 121..=127, _) => Ok(tag - 121),
        Value::Tag(tag @ 1280..=1400, _) => Ok(tag - 1280 + 7),
        _ => Err(decode_err(format!("Not a Plutus constructor: {:?}", v))),
    }
}

/// Read a u64 from a ciborium Integer value.
pub fn value_to_u64(v: &Value) -> Result<u64> {
    match v {
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            u64::try_from(n).map_err(|_| decode_err(format!("Integer out of u64 range: {}", n)))
        }
        _ => Err(decode_err(format!("Expected integer, got {:?}", v))),
    }
}

/// Read bytes from a ciborium Bytes value and return them as a lowercase hex string.
pub fn value_to_hex(v: &Value) -> Result<String> {
    value_to_bytes(v).map(hex::encode)
}

pub fn value_to_bytes(v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::Bytes(b) => Ok(b.clone()),
        _ => Err(decode_err(format!("Expected bytes, got {:?}", v))),
    }
}

/// Parse the two-field constr that represents a Cardano asset: (policy_bytes, name_bytes).
/// Returns `(policy_hex, name_hex)`.
pub fn parse_asset_constr(v: &Value) -> Result<(String, String)> {
    let fields = constr_fields(v)?;
    if fields.len() != 2 {
        return Err(decode_err(format!(
            "Asset constr expected 2 fields, got {}",
            fields.len()
        )));
    }
    let policy = value_to_hex(&fields[0])?;
    let name = value_to_hex(&fields[1])?;
    Ok((policy, name))
}

/// Plutus `AssetClass` for a unit; lovelace is the empty policy and name.
pub fn asset_class(unit: &str) -> Result<Value> {
    if unit == crate::models::asset::LOVELACE {
        return Ok(constr(0, vec![bytes(&[]), bytes(&[])]));
    }
    let asset = crate::models::Asset::from_identifier(unit)?;
    Ok(constr(
        0,
        vec![bytes(&asset.policy_bytes()), bytes(&asset.name_bytes())],
    ))
}

/// Inverse of [`asset_class`].
pub fn asset_class_unit(v: &Value) -> Result<String> {
    let (policy, name) = parse_asset_constr(v)?;
    if policy.is_empty() && name.is_empty() {
        Ok(crate::models::asset::LOVELACE.to_string())
    } else {
        Ok(format!("{}{}", policy, name))
    }
}

/// Decode a CBOR hex string into a ciborium Value.
pub fn decode_cbor(cbor_hex: &str) -> Result<Value> {
    let bytes = hex::decode(cbor_hex).map_err(|e| decode_err(format!("invalid hex: {}", e)))?;
    decode_cbor_bytes(&bytes)
}

pub fn decode_cbor_bytes(bytes: &[u8]) -> Result<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| decode_err(format!("CBOR decode error: {}", e)))
}

pub fn encode_cbor(v: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(v, &mut out)
        .map_err(|e| decode_err(format!("CBOR encode error: {}", e)))?;
    Ok(out)
}
