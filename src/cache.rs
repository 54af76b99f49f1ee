use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::blockfrost::ChainQuery;
use crate::error::{Error, Result};
use crate::models::pool::pool_nft_unit;
use crate::models::{PoolDetail, PoolTransaction, TxUtxoRecord};
use crate::utils::now_secs;

pub const TIMESTAMP_FILE: &str = "TIMESTAMP";
const PAGE_SIZE: u32 = 100;

/// Save a serializable object to a JSON file.
pub fn save_to_file<T: Serialize>(data: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| Error::Cache(format!("Failed to create cache file {}: {}", path.display(), e)))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, data)
        .map_err(|e| Error::Cache(format!("Failed to write cache to {}: {}", path.display(), e)))?;
    Ok(())
}

/// Load a deserializable object from a JSON file.
pub fn load_from_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::Cache(format!("Failed to open cache file {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    let data = serde_json::from_reader(reader)
        .map_err(|e| Error::Cache(format!("Failed to parse cache file {}: {}", path.display(), e)))?;
    Ok(data)
}

/// Snapshot of hydrated pools keyed by pool id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCache {
    pub updated_at: i64,
    pub pools: BTreeMap<String, PoolDetail>,
}

impl PoolCache {
    pub fn new(pools: Vec<PoolDetail>) -> Self {
        Self {
            updated_at: now_secs(),
            pools: pools
                .into_iter()
                .map(|p| (p.pool_id().to_string(), p))
                .collect(),
        }
    }

    pub fn get(&self, pool_id: &str) -> Option<&PoolDetail> {
        self.pools.get(pool_id)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_to_file(self, path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_from_file(path)
    }
}

/// `<cache_dir>/transactions/<pool_id>`
pub fn transaction_cache_dir(cache_dir: &Path, pool_id: &str) -> PathBuf {
    cache_dir.join("transactions").join(pool_id)
}

/// `YYYYMM` of a unix timestamp (UTC).
pub fn month_key(unix_secs: i64) -> String {
    let days = unix_secs.div_euclid(86_400);
    // Civil-from-days over 400-year eras.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    format!("{:04}{:02}", year, month)
}

fn bucket_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every cached transaction for one pool, oldest first. Empty when the
/// directory does not exist.
pub fn load_transactions(dir: &Path) -> Result<Vec<PoolTransaction>> {
    let mut txs = Vec::new();
    for file in bucket_files(dir)? {
        let bucket: Vec<PoolTransaction> = load_from_file(&file)?;
        txs.extend(bucket);
    }
    sort_transactions(&mut txs);
    Ok(txs)
}

fn sort_transactions(txs: &mut [PoolTransaction]) {
    txs.sort_by(|a, b| {
        (a.block_time, a.block_height, a.tx_index).cmp(&(b.block_time, b.block_height, b.tx_index))
    });
}

pub fn write_timestamp(dir: &Path) -> Result<()> {
    fs::write(dir.join(TIMESTAMP_FILE), now_secs().to_string())?;
    Ok(())
}

pub fn read_timestamp(dir: &Path) -> Result<i64> {
    let raw = fs::read_to_string(dir.join(TIMESTAMP_FILE))?;
    let trimmed = raw.trim();
    trimmed
        .parse::<i64>()
        .or_else(|_| trimmed.parse::<f64>().map(|f| f as i64))
        .map_err(|e| Error::Cache(format!("bad timestamp in {}: {}", dir.display(), e)))
}

/// Page through the transaction history of a pool's NFT and merge it into
/// the monthly buckets under `dir`.
///
/// Resumes from the page holding the last cached record. Stops at the first
/// short page or after `max_calls` requests, keeping what was fetched.
/// Returns the number of calls made.
pub async fn cache_transactions(
    api: &dyn ChainQuery,
    pool_id: &str,
    dir: &Path,
    max_calls: u32,
) -> Result<u32> {
    fs::create_dir_all(dir)?;
    write_timestamp(dir)?;

    let existing = load_transactions(dir)?;
    let unit = pool_nft_unit(pool_id);
    let mut page = existing.len() as u32 / PAGE_SIZE + 1;
    tracing::debug!("Pool {}: {} cached, starting at page {}", pool_id, existing.len(), page);

    let mut calls = 0;
    let mut fetched = Vec::new();
    while calls < max_calls {
        let batch = api.asset_transactions(&unit, page, PAGE_SIZE, true).await?;
        calls += 1;
        let done = batch.len() < PAGE_SIZE as usize;
        fetched.extend(batch);
        if done {
            break;
        }
        page += 1;
    }

    let mut seen: HashSet<String> = existing.iter().map(|t| t.tx_hash.clone()).collect();
    let fresh: Vec<PoolTransaction> = fetched
        .into_iter()
        .filter(|t| seen.insert(t.tx_hash.clone()))
        .collect();
    if fresh.is_empty() {
        return Ok(calls);
    }

    merge_buckets(dir, existing, fresh, |t| t.block_time, sort_transactions)?;
    Ok(calls)
}

/// Rewrite the month buckets `fresh` falls into, each holding its share of
/// `existing` plus the new records. Other months are left alone.
fn merge_buckets<T: Serialize>(
    dir: &Path,
    existing: Vec<T>,
    fresh: Vec<T>,
    block_time: impl Fn(&T) -> i64,
    sort: impl Fn(&mut [T]),
) -> Result<()> {
    let touched: HashSet<String> = fresh.iter().map(|r| month_key(block_time(r))).collect();
    let mut buckets: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for record in existing.into_iter().chain(fresh) {
        let key = month_key(block_time(&record));
        if touched.contains(&key) {
            buckets.entry(key).or_default().push(record);
        }
    }
    for (month, mut records) in buckets {
        sort(&mut records);
        tracing::debug!("Caching {} records for {} in {}", records.len(), month, dir.display());
        save_to_file(&records, dir.join(format!("{}.json", month)))?;
    }
    Ok(())
}

/// `<cache_dir>/utxos/<pool_id>`
pub fn utxo_cache_dir(cache_dir: &Path, pool_id: &str) -> PathBuf {
    cache_dir.join("utxos").join(pool_id)
}

/// Every cached input and output, ordered by block time. Records of one
/// transaction keep their relative order.
pub fn load_utxos(dir: &Path) -> Result<Vec<TxUtxoRecord>> {
    let mut records = Vec::new();
    for file in bucket_files(dir)? {
        let bucket: Vec<TxUtxoRecord> = load_from_file(&file)?;
        records.extend(bucket);
    }
    sort_utxos(&mut records);
    Ok(records)
}

fn sort_utxos(records: &mut [TxUtxoRecord]) {
    records.sort_by_key(|r| r.block_time);
}

/// Fetch inputs and outputs of the pool transactions cached under `tx_dir`
/// that are not yet in the UTxO cache at `utxo_dir`, oldest first, one call
/// per transaction and at most `max_calls` calls. Returns the calls made.
///
/// Fails with `Cache` when the transaction cache does not exist.
pub async fn cache_utxos(
    api: &dyn ChainQuery,
    tx_dir: &Path,
    utxo_dir: &Path,
    max_calls: u32,
) -> Result<u32> {
    if !tx_dir.is_dir() {
        return Err(Error::Cache(format!(
            "no transaction cache at {}, cache the pool history first",
            tx_dir.display()
        )));
    }
    let txs = load_transactions(tx_dir)?;
    fs::create_dir_all(utxo_dir)?;
    write_timestamp(utxo_dir)?;

    let existing = load_utxos(utxo_dir)?;
    let cached: HashSet<&str> = existing.iter().map(|r| r.hash.as_str()).collect();
    let pending: Vec<&PoolTransaction> = txs
        .iter()
        .filter(|t| !cached.contains(t.tx_hash.as_str()))
        .take(max_calls as usize)
        .collect();
    tracing::debug!("{} of {} transactions need UTxOs", pending.len(), txs.len());

    let mut calls = 0;
    let mut fresh = Vec::new();
    for tx in pending {
        let utxos = api.transaction_utxos(&tx.tx_hash).await?;
        calls += 1;
        match utxos {
            Some(utxos) => fresh.extend(utxos.into_records(tx.block_time)?),
            None => tracing::warn!("Transaction {} is not indexed", tx.tx_hash),
        }
    }
    if !fresh.is_empty() {
        merge_buckets(utxo_dir, existing, fresh, |r| r.block_time, sort_utxos)?;
    }
    Ok(calls)
}

/// Convert a legacy `time` value to integer seconds.
fn legacy_seconds(value: &Value, file: &Path) -> Result<i64> {
    let bad = |what: String| Error::Cache(format!("{}: {}", file.display(), what));
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Ok(f as i64),
                _ => Err(bad(format!("fractional time {}", n))),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| bad(format!("time {:?} is not integer seconds", s))),
        other => Err(bad(format!("unexpected time value {}", other))),
    }
}

fn migrate_records(records: &[Value], file: &Path) -> Result<Option<Vec<Value>>> {
    let legacy = records
        .iter()
        .any(|r| r.get("time").is_some() && r.get("block_time").is_none());
    if !legacy {
        return Ok(None);
    }

    let mut migrated = Vec::with_capacity(records.len());
    for record in records {
        let mut map: Map<String, Value> = record
            .as_object()
            .cloned()
            .ok_or_else(|| Error::Cache(format!("{}: record is not an object", file.display())))?;
        if let Some(time) = map.remove("time") {
            let secs = legacy_seconds(&time, file)?;
            map.entry("block_time").or_insert(Value::from(secs));
        }
        migrated.push(Value::Object(map));
    }
    Ok(Some(migrated))
}

/// Rewrite every bucket under `dir` (recursively) that still uses the legacy
/// `time` field so it uses `block_time` in integer seconds. Files already in
/// the current form are left untouched. Returns how many files were rewritten.
///
/// Every file is checked before any is written, so a bad value leaves the
/// directory as it was.
pub fn migrate_cache_dir(dir: &Path) -> Result<usize> {
    let mut pending = Vec::new();
    collect_migrations(dir, &mut pending)?;

    for (file, records) in &pending {
        save_to_file(records, file)?;
        tracing::info!("Migrated {}", file.display());
    }
    Ok(pending.len())
}

fn collect_migrations(dir: &Path, pending: &mut Vec<(PathBuf, Vec<Value>)>) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::Cache(format!("{} is not a directory", dir.display())));
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_migrations(&path, pending)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let content: Value = load_from_file(&path)?;
            // Pool snapshots and other non-bucket files are skipped.
            let Value::Array(records) = content else {
                continue;
            };
            if let Some(migrated) = migrate_records(&records, &path)? {
                pending.push((path, migrated));
            }
        }
    }
    Ok(())
}
