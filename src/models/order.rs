//! Order datums understood by the batcher.

use ciborium::value::Value;

use crate::config::Network;
use crate::dex::cbor::{
    asset_class, asset_class_unit, bytes, constr, constr_fields, constr_index, encode_cbor, int,
    value_to_hex, value_to_u64,
};
use crate::error::{Error, Result};
use crate::models::address::Address;

/// Lovelace paid to the batcher for executing an order.
pub const BATCHER_FEE: u64 = 2_000_000;
/// Lovelace locked with the order and returned with its output.
pub const OUTPUT_ADA: u64 = 2_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStep {
    SwapExactIn { desired_unit: String, min_receive: u64 },
    SwapExactOut { desired_unit: String, expected_receive: u64 },
    Deposit { min_lp: u64 },
    Withdraw { min_a: u64, min_b: u64 },
    ZapIn { desired_unit: String, min_lp: u64 },
}

impl OrderStep {
    pub fn to_plutus(&self) -> Result<Value> {
        Ok(match self {
            OrderStep::SwapExactIn {
                desired_unit,
                min_receive,
            } => constr(0, vec![asset_class(desired_unit)?, int(*min_receive)]),
            OrderStep::SwapExactOut {
                desired_unit,
                expected_receive,
            } => constr(1, vec![asset_class(desired_unit)?, int(*expected_receive)]),
            OrderStep::Deposit { min_lp } => constr(2, vec![int(*min_lp)]),
            OrderStep::Withdraw { min_a, min_b } => constr(3, vec![int(*min_a), int(*min_b)]),
            OrderStep::ZapIn {
                desired_unit,
                min_lp,
            } => constr(4, vec![asset_class(desired_unit)?, int(*min_lp)]),
        })
    }

    pub fn from_plutus(v: &Value) -> Result<Self> {
        let fields = constr_fields(v)?;
        let field = |i: usize| {
            fields
                .get(i)
                .ok_or_else(|| Error::Decode(format!("order step missing field {}", i)))
        };
        Ok(match constr_index(v)? {
            0 => OrderStep::SwapExactIn {
                desired_unit: asset_class_unit(field(0)?)?,
                min_receive: value_to_u64(field(1)?)?,
            },
            1 => OrderStep::SwapExactOut {
                desired_unit: asset_class_unit(field(0)?)?,
                expected_receive: value_to_u64(field(1)?)?,
            },
            2 => OrderStep::Deposit {
                min_lp: value_to_u64(field(0)?)?,
            },
            3 => OrderStep::Withdraw {
                min_a: value_to_u64(field(0)?)?,
                min_b: value_to_u64(field(1)?)?,
            },
            4 => OrderStep::ZapIn {
                desired_unit: asset_class_unit(field(0)?)?,
                min_lp: value_to_u64(field(1)?)?,
            },
            n => return Err(Error::Decode(format!("unknown order step {}", n))),
        })
    }
}

/// `Constr 0 [sender, receiver, Maybe receiver_datum_hash, step, batcher_fee, output_ada]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDatum {
    pub sender: Address,
    pub receiver: Address,
    pub receiver_datum_hash: Option<String>,
    pub step: OrderStep,
    pub batcher_fee: u64,
    pub output_ada: u64,
}

impl OrderDatum {
    /// Order paid and received by the same address, with the standard fees.
    pub fn new(owner: &Address, step: OrderStep) -> Self {
        Self {
            sender: owner.clone(),
            receiver: owner.clone(),
            receiver_datum_hash: None,
            step,
            batcher_fee: BATCHER_FEE,
            output_ada: OUTPUT_ADA,
        }
    }

    pub fn to_plutus(&self) -> Result<Value> {
        let receiver_datum_hash = match &self.receiver_datum_hash {
            Some(h) => {
                let raw = hex::decode(h)
                    .map_err(|e| Error::Decode(format!("invalid receiver datum hash: {}", e)))?;
                constr(0, vec![bytes(&raw)])
            }
            None => constr(1, vec![]),
        };
        Ok(constr(
            0,
            vec![
                self.sender.to_plutus(),
                self.receiver.to_plutus(),
                receiver_datum_hash,
                self.step.to_plutus()?,
                int(self.batcher_fee),
                int(self.output_ada),
            ],
        ))
    }

    pub fn from_plutus(v: &Value, network: Network) -> Result<Self> {
        let fields = constr_fields(v)?;
        if fields.len() != 6 {
            return Err(Error::Decode(format!(
                "order datum expected 6 fields, got {}",
                fields.len()
            )));
        }
        let receiver_datum_hash = match constr_index(&fields[2])? {
            0 => constr_fields(&fields[2])?
                .first()
                .map(value_to_hex)
                .transpose()?,
            _ => None,
        };
        Ok(Self {
            sender: Address::from_plutus(&fields[0], network)?,
            receiver: Address::from_plutus(&fields[1], network)?,
            receiver_datum_hash,
            step: OrderStep::from_plutus(&fields[3])?,
            batcher_fee: value_to_u64(&fields[4])?,
            output_ada: value_to_u64(&fields[5])?,
        })
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        encode_cbor(&self.to_plutus()?)
    }
}
