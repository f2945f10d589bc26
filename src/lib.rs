//! Atomic Ledger - a multi-chain UTXO ledger with atomic cross-chain transfers
//!
//! This library implements:
//! - A typed transaction model (base transfers, asset creation, operations, export, import)
//! - Stateless syntactic verification and stateful semantic execution
//! - Fee and burn accounting per asset
//! - Shared memory for exactly-once value transfer between chains
//! - A per-chain actor that serializes acceptance

pub mod chain;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod error;
pub mod fx;
pub mod shared_memory;
pub mod storage;

pub use error::{ErrorClass, LedgerError, Result};
