//! Multi-asset bundle used for UTxO contents, outputs and deltas.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use crate::error::{Error, Result};
use crate::models::asset::{unit_sort_key, Asset, LOVELACE};

/// Mapping from unit to quantity. Zero quantities are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assets(BTreeMap<String, u64>);

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lovelace(quantity: u64) -> Self {
        Self::single(LOVELACE, quantity)
    }

    pub fn single(unit: &str, quantity: u64) -> Self {
        let mut assets = Self::new();
        assets.insert(unit, quantity);
        assets
    }

    /// Set `unit` to `quantity`, removing it when zero.
    pub fn insert(&mut self, unit: &str, quantity: u64) {
        let unit = unit.replace('.', "");
        if quantity == 0 {
            self.0.remove(&unit);
        } else {
            self.0.insert(unit, quantity);
        }
    }

    pub fn quantity(&self, unit: &str) -> u64 {
        self.0.get(unit).copied().unwrap_or(0)
    }

    pub fn coin(&self) -> u64 {
        self.quantity(LOVELACE)
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.0.contains_key(unit)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Units with lovelace first, then native assets in identifier order.
    pub fn units(&self) -> Vec<&str> {
        let mut units: Vec<&str> = self.0.keys().map(String::as_str).collect();
        units.sort_by(|a, b| unit_sort_key(a).cmp(unit_sort_key(b)));
        units
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.units().into_iter().map(move |u| (u, self.quantity(u)))
    }

    /// Native assets only, grouped by policy in identifier order. Fails on
    /// the first unit that is not a valid asset identifier.
    pub fn multi_asset(&self) -> Result<BTreeMap<String, BTreeMap<String, u64>>> {
        let mut grouped: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for (unit, qty) in &self.0 {
            if unit == LOVELACE {
                continue;
            }
            let asset = Asset::from_identifier(unit)?;
            grouped
                .entry(asset.policy_id)
                .or_default()
                .insert(asset.name_hex, *qty);
        }
        Ok(grouped)
    }

    /// Quantities scaled down by `10^decimals(unit)`, as exact decimal strings
    /// without trailing zeros.
    pub fn naturalize(&self, decimals: impl Fn(&str) -> u32) -> BTreeMap<String, String> {
        self.iter()
            .map(|(unit, qty)| (unit.to_string(), shift_decimal(qty, decimals(unit))))
            .collect()
    }

    pub fn without(&self, unit: &str) -> Self {
        let mut out = self.clone();
        out.0.remove(unit);
        out
    }

    pub fn checked_add(&self, other: &Assets) -> Result<Assets> {
        let mut out = self.clone();
        for (unit, qty) in &other.0 {
            let current = out.quantity(unit);
            let sum = current
                .checked_add(*qty)
                .ok_or_else(|| Error::Decode(format!("quantity overflow for {}", unit)))?;
            out.insert(unit, sum);
        }
        Ok(out)
    }

    /// `self - other`; fails with `InsufficientFunds` on the first unit that
    /// would go negative.
    pub fn checked_sub(&self, other: &Assets) -> Result<Assets> {
        let mut out = self.clone();
        for (unit, qty) in &other.0 {
            let available = out.quantity(unit);
            if available < *qty {
                return Err(Error::insufficient(unit, *qty, available));
            }
            out.insert(unit, available - qty);
        }
        Ok(out)
    }
}

fn shift_decimal(quantity: u64, decimals: u32) -> String {
    let digits = quantity.to_string();
    let places = decimals as usize;
    if places == 0 {
        return digits;
    }
    let padded = format!("{:0>width$}", digits, width = places + 1);
    let (whole, frac) = padded.split_at(padded.len() - places);
    match frac.trim_end_matches('0') {
        "" => whole.to_string(),
        frac => format!("{}.{}", whole, frac),
    }
}

impl Add for Assets {
    type Output = Assets;

    /// Saturating addition; use `checked_add` where overflow must surface.
    fn add(mut self, rhs: Assets) -> Assets {
        self += rhs;
        self
    }
}

impl AddAssign for Assets {
    fn add_assign(&mut self, rhs: Assets) {
        for (unit, qty) in rhs.0 {
            let sum = self.quantity(&unit).saturating_add(qty);
            self.insert(&unit, sum);
        }
    }
}

impl FromIterator<(String, u64)> for Assets {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut assets = Assets::new();
        for (unit, qty) in iter {
            assets += Assets::single(&unit, qty);
        }
        assets
    }
}
