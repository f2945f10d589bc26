use crate::crypto::hash::{Hash160, Hash256};
use crate::crypto::signatures::{Signature, SignatureUtils};
use crate::{LedgerError, Result};
use secp256k1::{PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version byte for base58check address strings.
const ADDRESS_VERSION: u8 = 0x00;

#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: SecretKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key: Vec<u8>, // Compressed SEC1 encoding
}

impl PrivateKey {
    pub fn new() -> Result<Self> {
        let mut rng = OsRng;
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);

        Self::from_bytes(&secret_bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(LedgerError::Crypto("Private key must be 32 bytes".to_string()));
        }

        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid private key: {}", e)))?;

        Ok(Self { key: secret_key })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        let public_key = Secp256k1PublicKey::from_secret_key(&secp, &self.key);

        PublicKey {
            key: public_key.serialize().to_vec(),
        }
    }

    pub fn address(&self) -> Hash160 {
        self.public_key().address()
    }

    pub fn sign(&self, message: &Hash256) -> Signature {
        SignatureUtils::sign(&self.key, message)
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let public_key = Secp256k1PublicKey::from_slice(bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            key: public_key.serialize().to_vec(),
        })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn address(&self) -> Hash160 {
        Hash160::hash_sha256(&self.key)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.key))
    }
}

/// Base58check rendering of an owner address, for logs and configuration.
pub fn encode_address(address: &Hash160) -> String {
    let mut data = Vec::with_capacity(25);
    data.push(ADDRESS_VERSION);
    data.extend_from_slice(address.as_bytes());

    let checksum = Hash256::hash(Hash256::hash(&data).as_bytes());
    data.extend_from_slice(&checksum.as_bytes()[0..4]);

    bs58::encode(data).into_string()
}

pub fn decode_address(address: &str) -> Result<Hash160> {
    let decoded = bs58::decode(address).into_vec()
        .map_err(|e| LedgerError::Crypto(format!("Invalid address format: {}", e)))?;

    if decoded.len() != 25 || decoded[0] != ADDRESS_VERSION {
        return Err(LedgerError::Crypto("Invalid address format".to_string()));
    }

    let checksum = Hash256::hash(Hash256::hash(&decoded[0..21]).as_bytes());
    if checksum.as_bytes()[0..4] != decoded[21..25] {
        return Err(LedgerError::Crypto("Invalid address checksum".to_string()));
    }

    Hash160::from_slice(&decoded[1..21])
        .ok_or_else(|| LedgerError::Crypto("Invalid address length".to_string()))
}
