use anyhow::{anyhow, bail, Result};
use minswap_rs::cache::{
    cache_transactions, cache_utxos, migrate_cache_dir, transaction_cache_dir, utxo_cache_dir, PoolCache,
};
use minswap_rs::dex::{BaseDex, Minswap};
use minswap_rs::models::asset::LOVELACE;
use minswap_rs::models::Asset;
use minswap_rs::utils::{join_policy_id, split_policy_id};
use minswap_rs::{AssetRegistry, Assets, BlockfrostApi, Config};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const CONCURRENCY: usize = 5;

#[derive(Serialize)]
struct PoolExport {
    pool_id: String,
    pair: String,
    asset_a: String,
    asset_b: String,
    reserve_a: String,
    reserve_b: String,
    pool_fee_bps: u64,
    tx_hash: String,
}

#[derive(Serialize)]
struct AssetExport {
    unit: String,
    ticker: String,
    decimals: u32,
    total_supply: String,
    circulating_supply: String,
}

#[derive(Serialize)]
struct QuoteExport {
    pool_id: String,
    unit_in: String,
    amount_in: u64,
    unit_out: String,
    amount_out: u64,
    price_impact_percent: f64,
}

fn display_name(unit: &str) -> String {
    if unit == LOVELACE {
        return "ADA".to_string();
    }
    Asset::from_identifier(unit)
        .map(|a| a.asset_name())
        .unwrap_or_else(|_| unit.to_string())
}

fn print_usage(bin: &str) {
    eprintln!("Usage:");
    eprintln!("  {} pools [--hydrate]", bin);
    eprintln!("  {} pool <pool_id>", bin);
    eprintln!("  {} quote <pool_id> <unit_in> <amount_in>", bin);
    eprintln!("  {} history <pool_id> [max_calls]", bin);
    eprintln!("  {} utxos <pool_id> [max_calls]", bin);
    eprintln!("  {} asset <unit> [--refresh]", bin);
    eprintln!("  {} migrate-cache <dir>", bin);
    eprintln!();
    eprintln!("  Environment: PROJECT_ID (required), NETWORK (mainnet|preprod|preview), MAX_CALLS");
    eprintln!("  Use 'lovelace' for ADA.");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let bin = args.first().map(String::as_str).unwrap_or("minswap-rs");
    let Some(command) = args.get(1) else {
        print_usage(bin);
        std::process::exit(1);
    };
    let rest = &args[2..];

    // Needs no network access.
    if command == "migrate-cache" {
        let dir = rest.first().ok_or_else(|| anyhow!("migrate-cache requires a directory"))?;
        let rewritten = migrate_cache_dir(Path::new(dir))?;
        eprintln!("Migrated {} file(s)", rewritten);
        return Ok(());
    }

    let config = Config::from_env()?;
    let api = Arc::new(BlockfrostApi::new(&config)?);
    let dex = Minswap::new(api.clone());

    match (command.as_str(), rest) {
        ("pools", flags) => {
            let hydrate = flags.iter().any(|f| f == "--hydrate");
            export_pools(&dex, &config, hydrate).await?
        }
        ("pool", [pool_id]) => {
            let detail = dex
                .pool_detail_by_id(pool_id)
                .await?
                .ok_or_else(|| anyhow!("pool {} not found", pool_id))?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        ("quote", [pool_id, unit_in, amount]) => {
            let amount_in: u64 = amount.parse()?;
            let pool = dex
                .pool_by_id(pool_id)
                .await?
                .ok_or_else(|| anyhow!("pool {} not found", pool_id))?;
            let (out, impact) = pool.amount_out(unit_in, amount_in)?;
            let (unit_out, amount_out) = out
                .iter()
                .next()
                .map(|(u, q)| (u.to_string(), q))
                .ok_or_else(|| anyhow!("empty quote"))?;
            let quote = QuoteExport {
                pool_id: pool.pool_id.clone(),
                unit_in: unit_in.clone(),
                amount_in,
                unit_out,
                amount_out,
                price_impact_percent: impact,
            };
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
        ("history", [pool_id, max_calls @ ..]) if max_calls.len() <= 1 => {
            let max_calls = match max_calls.first() {
                Some(n) => n.parse()?,
                None => 1_000,
            };
            let dir = transaction_cache_dir(&config.cache_dir, pool_id);
            let calls = cache_transactions(&*api, pool_id, &dir, max_calls).await?;
            eprintln!("Cached history for {} using {} call(s)", pool_id, calls);
        }
        ("utxos", [pool_id, max_calls @ ..]) if max_calls.len() <= 1 => {
            let max_calls = match max_calls.first() {
                Some(n) => n.parse()?,
                None => 1_000,
            };
            let tx_dir = transaction_cache_dir(&config.cache_dir, pool_id);
            let utxo_dir = utxo_cache_dir(&config.cache_dir, pool_id);
            let calls = cache_utxos(&*api, &tx_dir, &utxo_dir, max_calls).await?;
            eprintln!("Cached UTxOs for {} using {} call(s)", pool_id, calls);
        }
        ("asset", [unit, flags @ ..]) => {
            let unit = &join_policy_id(unit);
            let refresh = flags.iter().any(|f| f == "--refresh");
            let registry = AssetRegistry::new(api.clone(), &config.cache_dir);
            if refresh {
                registry
                    .update(unit)
                    .await?
                    .ok_or_else(|| anyhow!("asset {} not found", unit))?;
            }
            let decimals = registry.decimals(unit).await?;
            let supply = registry.supply(unit).await?;
            let natural = |q: u64| {
                Assets::single(unit, q)
                    .naturalize(|_| decimals)
                    .remove(unit)
                    .unwrap_or_else(|| "0".to_string())
            };
            let export = AssetExport {
                unit: unit.to_string(),
                ticker: registry.ticker(unit).await?,
                decimals,
                total_supply: natural(supply.total),
                circulating_supply: natural(supply.circulating),
            };
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
        (other, _) => {
            print_usage(bin);
            bail!("unknown command or arguments: {}", other);
        }
    }

    eprintln!("Blockfrost calls this session: {}", api.limiter().total_calls().await);
    Ok(())
}

async fn export_pools(dex: &Minswap, config: &Config, hydrate: bool) -> Result<()> {
    eprintln!("Fetching all pool UTxOs...");
    let pools = dex.all_pools().await?;
    eprintln!("Found {} pools", pools.len());

    if hydrate {
        let total = pools.len();
        let details = dex.hydrate_all(pools, CONCURRENCY).await;
        std::fs::create_dir_all(&config.cache_dir)?;
        let path = config.cache_dir.join("pools.json");
        let saved = details.len();
        PoolCache::new(details).save(&path)?;
        eprintln!(
            "Saved {} pools to {} (skipped {})",
            saved,
            path.display(),
            total - saved
        );
        return Ok(());
    }

    let exports: Vec<PoolExport> = pools
        .iter()
        .map(|p| PoolExport {
            pool_id: p.pool_id.clone(),
            pair: format!("{}/{}", display_name(&p.unit_a), display_name(&p.unit_b)),
            asset_a: split_policy_id(&p.unit_a),
            asset_b: split_policy_id(&p.unit_b),
            reserve_a: p.reserve_a.to_string(),
            reserve_b: p.reserve_b.to_string(),
            pool_fee_bps: p.fee_bps,
            tx_hash: p.tx_hash.clone(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&exports)?);
    Ok(())
}
