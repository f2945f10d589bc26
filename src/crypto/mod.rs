//! Cryptographic primitives: hashing, secp256k1 keys and recoverable signatures

pub mod keys;
pub mod signatures;
pub mod hash;

pub use keys::{PrivateKey, PublicKey};
pub use signatures::Signature;
pub use hash::{Hash160, Hash256};
