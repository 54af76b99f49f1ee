pub mod builder;
pub mod encode;
pub mod order;

pub use builder::TxBuilder;
pub use encode::{Transaction, TxOutput, VKeyWitness};
pub use order::{OrderAccount, SwapRequest, DEFAULT_SLIPPAGE};
