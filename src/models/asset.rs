use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unit string of the base currency.
pub const LOVELACE: &str = "lovelace";

/// Length of a hex-encoded policy id.
pub const POLICY_ID_HEX_LEN: usize = 56;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Asset {
    pub policy_id: String,
    pub name_hex: String,
}

impl Asset {
    pub fn new(policy_id: &str, name_hex: &str) -> Self {
        Self {
            policy_id: policy_id.to_lowercase(),
            name_hex: name_hex.to_lowercase(),
        }
    }

    pub fn from_identifier(id: &str) -> Result<Asset> {
        let id = id.replace('.', "");
        if id.len() < POLICY_ID_HEX_LEN || hex::decode(&id).is_err() {
            return Err(Error::Decode(format!("invalid asset identifier '{}'", id)));
        }
        Ok(Asset::new(&id[..POLICY_ID_HEX_LEN], &id[POLICY_ID_HEX_LEN..]))
    }

    pub fn asset_name(&self) -> String {
        String::from_utf8_lossy(&hex::decode(&self.name_hex).unwrap_or_default()).to_string()
    }

    pub fn policy_bytes(&self) -> Vec<u8> {
        hex::decode(&self.policy_id).unwrap_or_default()
    }

    pub fn name_bytes(&self) -> Vec<u8> {
        hex::decode(&self.name_hex).unwrap_or_default()
    }
}

/// Sort key placing lovelace before every native asset.
pub fn unit_sort_key(unit: &str) -> &str {
    if unit == LOVELACE {
        ""
    } else {
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: &str = "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e";

    #[test]
    fn test_from_identifier() {
        let asset = Asset::from_identifier(MIN).unwrap();
        assert_eq!(asset.policy_id, &MIN[..56]);
        assert_eq!(asset.name_hex, "4d494e");
        assert_eq!(asset.asset_name(), "MIN");
        assert_eq!(asset.name_bytes(), b"MIN".to_vec());
    }

    #[test]
    fn test_dotted_identifier() {
        let dotted = format!("{}.{}", &MIN[..56], &MIN[56..]);
        assert_eq!(Asset::from_identifier(&dotted).unwrap(), Asset::from_identifier(MIN).unwrap());
    }

    #[test]
    fn test_invalid_identifier() {
        assert!(Asset::from_identifier("abcd").is_err());
        assert!(Asset::from_identifier(&"z".repeat(60)).is_err());
    }

    #[test]
    fn test_unit_sort_key() {
        let mut units = vec![MIN, LOVELACE, "0be55d262b29f564998ff81efe21bdc0022621c12f15af08d0f2ddb1"];
        units.sort_by(|a, b| unit_sort_key(a).cmp(unit_sort_key(b)));
        assert_eq!(units[0], LOVELACE);
        assert_eq!(units[2], MIN);
    }
}
