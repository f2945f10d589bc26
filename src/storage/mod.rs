//! sled-backed key-value storage shared by the chain-local UTXO sets and
//! cross-chain shared memory.

pub mod database;

pub use database::{BatchOp, Database, KvIter, LocalTree, SharedOp};
