use serde::{Deserialize, Serialize};

use crate::models::Assets;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub unit: String,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub quantity: String,
}

fn deserialize_quantity<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Q {
        Str(String),
        Num(u64),
    }
    let q = Q::deserialize(deserializer)?;
    Ok(match q {
        Q::Str(s) => s,
        Q::Num(n) => n.to_string(),
    })
}

/// Parse a Blockfrost `amount` list.
pub fn assets_from_units(units: &[Unit]) -> crate::error::Result<Assets> {
    let mut amount = Assets::new();
    for u in units {
        let qty = u.quantity.parse::<u64>().map_err(|e| {
            crate::error::Error::Decode(format!("bad quantity '{}' for {}: {}", u.quantity, u.unit, e))
        })?;
        amount = amount.checked_add(&Assets::single(&u.unit, qty))?;
    }
    Ok(amount)
}

/// An address UTxO as returned by `/addresses/{address}/utxos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockfrostUtxo {
    pub address: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub amount: Vec<Unit>,
    #[serde(default)]
    pub block: String,
    pub data_hash: Option<String>,
    pub inline_datum: Option<String>,
    pub reference_script_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utxo {
    pub address: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub amount: Assets,
    pub block: String,
    pub data_hash: Option<String>,
    pub inline_datum: Option<String>,
    pub reference_script_hash: Option<String>,
}

impl Utxo {
    pub fn has_asset(&self, unit: &str) -> bool {
        self.amount.contains(unit)
    }

    /// Same output reference (`tx_hash#output_index`).
    pub fn same_ref(&self, other: &Utxo) -> bool {
        self.tx_hash == other.tx_hash && self.output_index == other.output_index
    }

    pub fn out_ref(&self) -> String {
        format!("{}#{}", self.tx_hash, self.output_index)
    }

    /// Only lovelace, no native assets and no datum.
    pub fn is_pure_lovelace(&self) -> bool {
        self.amount.len() == 1 && self.amount.coin() > 0 && self.data_hash.is_none()
    }
}

impl TryFrom<BlockfrostUtxo> for Utxo {
    type Error = crate::error::Error;

    fn try_from(raw: BlockfrostUtxo) -> Result<Self, Self::Error> {
        let amount = assets_from_units(&raw.amount)?;
        Ok(Utxo {
            address: raw.address,
            tx_hash: raw.tx_hash,
            output_index: raw.output_index,
            amount,
            block: raw.block,
            data_hash: raw.data_hash,
            inline_datum: raw.inline_datum,
            reference_script_hash: raw.reference_script_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blockfrost_utxo() {
        let json = r#"{
            "address": "addr1wxn9efv2f6w82hagxqtn62ju4m293tqvw0uhmdl64ch8uwc0h43gt",
            "tx_hash": "39a7a284c2a0948189dc45dec670211cd4d72f7b66c5726c08d9b3df11e44d58",
            "tx_index": 0,
            "output_index": 0,
            "amount": [
                {"unit": "lovelace", "quantity": "42000000"},
                {"unit": "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e", "quantity": 12}
            ],
            "block": "7eb8e27d18686c7db9a18f8bbcfe34e3fed6e047afaa2d969904d15e934847e6",
            "data_hash": "9e478573ab81ea7a8e31891ce0648b81229f408d596a3483e6f4f9b92d3cf710",
            "inline_datum": null,
            "reference_script_hash": null
        }"#;
        let raw: BlockfrostUtxo = serde_json::from_str(json).unwrap();
        let utxo = Utxo::try_from(raw).unwrap();
        assert_eq!(utxo.amount.coin(), 42_000_000);
        assert_eq!(
            utxo.amount
                .quantity("29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e"),
            12
        );
        assert!(utxo.data_hash.is_some());
        assert!(!utxo.is_pure_lovelace());
        assert!(utxo.out_ref().ends_with("#0"));
    }

    #[test]
    fn test_bad_quantity() {
        let raw = BlockfrostUtxo {
            address: String::new(),
            tx_hash: String::new(),
            output_index: 0,
            amount: vec![Unit {
                unit: "lovelace".into(),
                quantity: "-1".into(),
            }],
            block: String::new(),
            data_hash: None,
            inline_datum: None,
            reference_script_hash: None,
        };
        assert!(Utxo::try_from(raw).is_err());
    }
}
