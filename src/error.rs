use crate::crypto::hash::Hash256;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// How a caller should treat a rejected transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed transaction, detected before any state access.
    Structural,
    /// Valid shape but can never be accepted. Discard.
    Permanent,
    /// A dependency is not visible yet. Re-queue.
    Temporary,
    /// Storage or encoding failure. Halt chain processing.
    Fatal,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    // Structural
    #[error("Wrong network id: expected {expected}, got {actual}")]
    WrongNetworkId { expected: u32, actual: u32 },

    #[error("Wrong chain id: expected {expected}, got {actual}")]
    WrongChainId { expected: Hash256, actual: Hash256 },

    #[error("Memo too large: {size} bytes, maximum {max}")]
    MemoTooLarge { size: usize, max: usize },

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Outputs are not sorted")]
    OutputsNotSorted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Inputs are not sorted and unique")]
    InputsNotSortedOrDuplicate,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Invalid asset definition: {0}")]
    InvalidAssetDefinition(String),

    #[error("Initial states are not sorted and unique")]
    InitialStatesNotSortedOrDuplicate,

    #[error("Unknown feature extension: {0}")]
    UnknownFx(u32),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid transaction: {0}")]
    InvalidTx(String),

    #[error("Wrong number of credentials: expected {expected}, got {actual}")]
    WrongNumberOfCredentials { expected: usize, actual: usize },

    #[error("Nil or invalid credential: {0}")]
    NilOrInvalidCredential(String),

    // Semantic
    #[error("Insufficient funds for asset {asset}: required {required}, available {available}")]
    InsufficientFunds { asset: Hash256, required: u64, available: u64 },

    #[error("Double spend detected for utxo {0}")]
    DoubleSpend(Hash256),

    #[error("Missing utxo {id}")]
    MissingUtxo { id: Hash256, temporary: bool },

    #[error("Missing asset {id}")]
    MissingAsset { id: Hash256, temporary: bool },

    #[error("Asset id mismatch: expected {expected}, got {actual}")]
    AssetIdMismatch { expected: Hash256, actual: Hash256 },

    #[error("Unsupported feature extension: {0}")]
    UnsupportedFx(String),

    #[error("Wrong utxo type: {0}")]
    WrongUtxoType(String),

    #[error("Input amount mismatch: claimed {claimed}, utxo holds {actual}")]
    InputAmountMismatch { claimed: u64, actual: u64 },

    #[error("Output locked until {locktime}, current time {now}")]
    Locked { locktime: u64, now: u64 },

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Fatal
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Chain actor stopped")]
    ChainStopped,

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        use LedgerError::*;

        match self {
            WrongNetworkId { .. }
            | WrongChainId { .. }
            | MemoTooLarge { .. }
            | InvalidOutput(_)
            | OutputsNotSorted
            | InvalidInput(_)
            | InputsNotSortedOrDuplicate
            | Overflow
            | InvalidAssetDefinition(_)
            | InitialStatesNotSortedOrDuplicate
            | UnknownFx(_)
            | InvalidOperation(_)
            | InvalidTx(_)
            | WrongNumberOfCredentials { .. }
            | NilOrInvalidCredential(_) => ErrorClass::Structural,

            MissingUtxo { temporary: true, .. } | MissingAsset { temporary: true, .. } => {
                ErrorClass::Temporary
            }

            InsufficientFunds { .. }
            | DoubleSpend(_)
            | MissingUtxo { .. }
            | MissingAsset { .. }
            | AssetIdMismatch { .. }
            | UnsupportedFx(_)
            | WrongUtxoType(_)
            | InputAmountMismatch { .. }
            | Locked { .. }
            | InvalidCredential(_)
            | Unauthorized(_) => ErrorClass::Permanent,

            Storage(_) | Codec(_) | Crypto(_) | ChainStopped | Encoding(_)
            | Serialization(_) | Database(_) | Io(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.class() == ErrorClass::Temporary
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}
