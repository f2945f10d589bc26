//! Core ledger components

pub mod components;
pub mod transaction;
pub mod utxo;

pub use components::{Address, AssetId, ChainId, InputId, TransferableInput, TransferableOutput, TxId, Utxo, UtxoId};
pub use transaction::{BaseTx, CreateAssetTx, ExportTx, ImportTx, InitialState, Operation, OperationTx, SignedTx, UnsignedTx};
pub use utxo::{AssetDefinition, UtxoState, UtxoStore};
