//! Shelley address decoding plus its Plutus data form (used in order datums).

use ciborium::value::Value;
use std::fmt;

use crate::config::Network;
use crate::dex::cbor::{bytes, constr, constr_fields, constr_index, value_to_bytes};
use crate::error::{Error, Result};

pub const HASH_LEN: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Credential {
    Key([u8; HASH_LEN]),
    Script([u8; HASH_LEN]),
}

impl Credential {
    pub fn hash(&self) -> &[u8; HASH_LEN] {
        match self {
            Credential::Key(h) | Credential::Script(h) => h,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Credential::Script(_))
    }

    fn to_plutus(self) -> Value {
        match self {
            Credential::Key(h) => constr(0, vec![bytes(&h)]),
            Credential::Script(h) => constr(1, vec![bytes(&h)]),
        }
    }

    fn from_plutus(v: &Value) -> Result<Self> {
        let fields = constr_fields(v)?;
        let raw = fields
            .first()
            .ok_or_else(|| Error::Decode("empty credential constr".to_string()))
            .and_then(value_to_bytes)?;
        let hash = to_hash(&raw)?;
        match constr_index(v)? {
            0 => Ok(Credential::Key(hash)),
            1 => Ok(Credential::Script(hash)),
            n => Err(Error::Decode(format!("unknown credential constructor {}", n))),
        }
    }
}

fn to_hash(raw: &[u8]) -> Result<[u8; HASH_LEN]> {
    raw.try_into()
        .map_err(|_| Error::Decode(format!("expected {} byte hash, got {}", HASH_LEN, raw.len())))
}

/// A decoded Shelley-era address.
///
/// Pointer addresses are accepted but their stake part is not modelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub network_id: u8,
    pub payment: Credential,
    pub stake: Option<Credential>,
    raw: Vec<u8>,
}

impl Address {
    /// Base (payment + stake) or enterprise address from credentials.
    pub fn new(network: Network, payment: Credential, stake: Option<Credential>) -> Self {
        let network_id = network.network_id();
        let kind: u8 = match (&payment, &stake) {
            (Credential::Key(_), Some(Credential::Key(_))) => 0,
            (Credential::Script(_), Some(Credential::Key(_))) => 1,
            (Credential::Key(_), Some(Credential::Script(_))) => 2,
            (Credential::Script(_), Some(Credential::Script(_))) => 3,
            (Credential::Key(_), None) => 6,
            (Credential::Script(_), None) => 7,
        };
        let mut raw = Vec::with_capacity(1 + 2 * HASH_LEN);
        raw.push((kind << 4) | network_id);
        raw.extend_from_slice(payment.hash());
        if let Some(s) = &stake {
            raw.extend_from_slice(s.hash());
        }
        Self {
            network_id,
            payment,
            stake,
            raw,
        }
    }

    pub fn from_bech32(addr: &str) -> Result<Self> {
        let (_, raw) = bech32::decode(addr)
            .map_err(|e| Error::Decode(format!("invalid bech32 address {}: {}", addr, e)))?;
        Self::from_bytes(&raw)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let header = *raw
            .first()
            .ok_or_else(|| Error::Decode("empty address".to_string()))?;
        let kind = header >> 4;
        let network_id = header & 0x0f;

        let hash_at = |offset: usize| -> Result<[u8; HASH_LEN]> {
            raw.get(offset..offset + HASH_LEN)
                .ok_or_else(|| Error::Decode(format!("address too short for header {:#x}", header)))
                .and_then(to_hash)
        };

        let payment_hash = hash_at(1)?;
        let payment = if matches!(kind, 1 | 3 | 5 | 7) {
            Credential::Script(payment_hash)
        } else {
            Credential::Key(payment_hash)
        };
        let stake = match kind {
            0 | 1 => Some(Credential::Key(hash_at(1 + HASH_LEN)?)),
            2 | 3 => Some(Credential::Script(hash_at(1 + HASH_LEN)?)),
            4..=7 => None,
            other => {
                return Err(Error::Decode(format!(
                    "unsupported address type {} (byron or reward address)",
                    other
                )))
            }
        };

        Ok(Self {
            network_id,
            payment,
            stake,
            raw: raw.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_mainnet(&self) -> bool {
        self.network_id == 1
    }

    pub fn to_bech32(&self) -> Result<String> {
        let hrp = if self.is_mainnet() { "addr" } else { "addr_test" };
        let hrp = bech32::Hrp::parse(hrp).map_err(|e| Error::Decode(format!("bech32 HRP error: {}", e)))?;
        bech32::encode::<bech32::Bech32>(hrp, &self.raw)
            .map_err(|e| Error::Decode(format!("bech32 encode error: {}", e)))
    }

    /// Plutus `Address`: `Constr 0 [payment, Maybe (StakingHash credential)]`.
    pub fn to_plutus(&self) -> Value {
        let stake = match self.stake {
            Some(s) => constr(0, vec![constr(0, vec![s.to_plutus()])]),
            None => constr(1, vec![]),
        };
        constr(0, vec![self.payment.to_plutus(), stake])
    }

    pub fn from_plutus(v: &Value, network: Network) -> Result<Self> {
        let fields = constr_fields(v)?;
        if fields.len() != 2 {
            return Err(Error::Decode(format!(
                "plutus address expected 2 fields, got {}",
                fields.len()
            )));
        }
        let payment = Credential::from_plutus(&fields[0])?;
        let stake = match constr_index(&fields[1])? {
            0 => {
                let just = constr_fields(&fields[1])?;
                let staking_hash = just
                    .first()
                    .ok_or_else(|| Error::Decode("empty stake constr".to_string()))?;
                if constr_index(staking_hash)? != 0 {
                    return Err(Error::Decode("stake pointers are not supported".to_string()));
                }
                let inner = constr_fields(staking_hash)?
                    .first()
                    .ok_or_else(|| Error::Decode("empty staking hash".to_string()))?;
                Some(Credential::from_plutus(inner)?)
            }
            _ => None,
        };
        Ok(Address::new(network, payment, stake))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_bech32() {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{}", hex::encode(&self.raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::cbor::encode_cbor;

    const POOL: &str = "addr1z8snz7c4974vzdpxu65ruphl3zjdvtxw8strf2c2tmqnxz2j2c79gy9l76sdg0xwhd7r0c0kna0tycz4y5s6mlenh8pq0xmsha";
    const ORDER: &str = "addr1wxn9efv2f6w82hagxqtn62ju4m293tqvw0uhmdl64ch8uwc0h43gt";

    #[test]
    fn test_decode_script_base_address() {
        let addr = Address::from_bech32(POOL).unwrap();
        assert!(addr.is_mainnet());
        assert!(addr.payment.is_script());
        assert!(matches!(addr.stake, Some(Credential::Key(_))));
        assert_eq!(addr.to_bech32().unwrap(), POOL);
    }

    #[test]
    fn test_decode_enterprise_script_address() {
        let addr = Address::from_bech32(ORDER).unwrap();
        assert!(addr.payment.is_script());
        assert!(addr.stake.is_none());
        assert_eq!(addr.to_bytes()[0], 0x71);
        assert_eq!(addr.to_string(), ORDER);
    }

    #[test]
    fn test_build_base_address() {
        let addr = Address::new(
            Network::Preprod,
            Credential::Key([1u8; 28]),
            Some(Credential::Key([2u8; 28])),
        );
        assert_eq!(addr.to_bytes()[0], 0x00);
        assert_eq!(addr.to_bytes().len(), 57);
        assert!(addr.to_bech32().unwrap().starts_with("addr_test1q"));
        let back = Address::from_bech32(&addr.to_bech32().unwrap()).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_plutus_form() {
        let addr = Address::new(
            Network::Mainnet,
            Credential::Key([1u8; 28]),
            Some(Credential::Key([2u8; 28])),
        );
        let value = addr.to_plutus();
        // Constr0 [Constr0 [pkh], Constr0 [Constr0 [Constr0 [skh]]]]
        let hex = hex::encode(encode_cbor(&value).unwrap());
        assert!(hex.starts_with("d87982d87981581c"));
        let back = Address::from_plutus(&value, Network::Mainnet).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_plutus_without_stake() {
        let addr = Address::new(Network::Mainnet, Credential::Key([9u8; 28]), None);
        let back = Address::from_plutus(&addr.to_plutus(), Network::Mainnet).unwrap();
        assert_eq!(back.stake, None);
        assert_eq!(back.to_bytes()[0], 0x61);
    }
}
