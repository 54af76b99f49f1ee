pub mod address;
pub mod asset;
pub mod asset_info;
pub mod assets;
pub mod chain;
pub mod order;
pub mod pool;
pub mod utxo;

pub use address::{Address, Credential};
pub use asset::Asset;
pub use asset_info::{AssetAction, AssetHistoryEntry, AssetInfo, AssetMetadata, TxUtxoRecord, TxUtxos, UtxoSide};
pub use assets::Assets;
pub use chain::{PoolTransaction, ProtocolParams};
pub use order::{OrderDatum, OrderStep};
pub use pool::{FeeSharing, PoolDetail, PoolGeneration, PoolSummary};
pub use utxo::{BlockfrostUtxo, Unit, Utxo};
