//! # minswap-rs
//!
//! A Rust client for Minswap V1 on Cardano. Discovers liquidity pools,
//! prices swaps and builds order transactions, using Blockfrost as the
//! chain backend.
//!
//! Pools are fetched in two stages: a [`PoolSummary`] is parsed from the pool
//! UTxO alone (reserves, assets, fee), and [`PoolSummary::hydrate`] fetches the
//! pool datum once for LP supply and fee-sharing data.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use minswap_rs::{BlockfrostApi, Config, Network, dex::{BaseDex, Minswap}};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("mainnetXXXXXXXX", Network::Mainnet);
//!     let dex = Minswap::new(Arc::new(BlockfrostApi::new(&config)?));
//!
//!     for pool in dex.pools_for_pair(
//!         "lovelace",
//!         "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e",
//!     ).await? {
//!         let (price_a, _) = pool.price();
//!         println!("{} {} / {} = {}", pool.pool_id, pool.reserve_a, pool.reserve_b, price_a);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # List every pool
//! PROJECT_ID=... cargo run --release -- pools
//!
//! # Quote 10 ADA into MIN
//! PROJECT_ID=... cargo run --release -- quote <pool_id> lovelace 10000000
//!
//! # Ticker, decimals and circulating supply of MIN
//! PROJECT_ID=... cargo run --release -- asset 29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e
//!
//! # Rewrite a legacy transaction cache
//! cargo run --release -- migrate-cache data/transactions
//! ```

pub mod blockfrost;
pub mod cache;
pub mod config;
pub mod dex;
pub mod error;
pub mod math;
pub mod models;
pub mod rate_limit;
pub mod registry;
pub mod tx;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use blockfrost::{BlockfrostApi, ChainQuery};
pub use cache::{load_from_file, save_to_file, PoolCache};
pub use config::{Config, Network, RateLimitConfig};
pub use dex::{BaseDex, Minswap};
pub use error::{Error, Result};
pub use models::{Address, Assets, OrderDatum, OrderStep, PoolDetail, PoolSummary, Utxo};
pub use rate_limit::RateLimiter;
pub use registry::{AssetRegistry, Supply};
pub use tx::{SwapRequest, Transaction};
pub use wallet::{KeyDeriver, Keychain, Wallet};
