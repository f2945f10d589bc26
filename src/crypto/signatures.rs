use crate::crypto::hash::{Hash160, Hash256};
use crate::crypto::keys::PublicKey;
use crate::{LedgerError, Result};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

/// Compact `r || s` followed by the recovery id.
pub const SIGNATURE_LEN: usize = 65;

/// A recoverable secp256k1 signature as carried in credentials.
///
/// Decoding never validates the bytes; `check_shape` does that so the
/// syntactic verifier can reject malformed credentials with a typed error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let signature = Self(bytes.to_vec());
        signature.check_shape()?;
        Ok(signature)
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Accepts only well-formed signatures in lower-S form: `s` and `n - s`
    /// both verify, and a signed transaction must have a single valid id.
    pub fn check_shape(&self) -> Result<()> {
        if self.0.len() != SIGNATURE_LEN {
            return Err(LedgerError::Crypto(format!(
                "Invalid signature length {}, expected {}",
                self.0.len(),
                SIGNATURE_LEN
            )));
        }

        let recovery_id = self.recovery_id();
        let recovery_id = RecoveryId::from_i32(recovery_id as i32)
            .map_err(|_| LedgerError::Crypto(format!("Invalid recovery id {}", recovery_id)))?;
        let recoverable = RecoverableSignature::from_compact(&self.0[..64], recovery_id)
            .map_err(|e| LedgerError::Crypto(format!("Invalid recoverable signature: {}", e)))?;

        let standard = recoverable.to_standard();
        let mut normalized = standard;
        normalized.normalize_s();
        if normalized != standard {
            return Err(LedgerError::Crypto("Signature is not in lower-S form".to_string()));
        }

        Ok(())
    }

    /// Last byte of the encoding. Only meaningful once the length is checked.
    fn recovery_id(&self) -> u8 {
        self.0[SIGNATURE_LEN - 1]
    }

    pub fn from_recoverable(signature: &RecoverableSignature) -> Self {
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = Vec::with_capacity(SIGNATURE_LEN);
        bytes.extend_from_slice(&compact);
        bytes.push(recovery_id.to_i32() as u8);
        Self(bytes)
    }

    pub fn to_recoverable(&self) -> Result<RecoverableSignature> {
        self.check_shape()?;

        let recovery_id = RecoveryId::from_i32(self.recovery_id() as i32)
            .map_err(|e| LedgerError::Crypto(format!("Invalid recovery ID: {}", e)))?;

        RecoverableSignature::from_compact(&self.0[..64], recovery_id)
            .map_err(|e| LedgerError::Crypto(format!("Invalid recoverable signature: {}", e)))
    }
}

// Signature creation and recovery utilities
pub struct SignatureUtils;

impl SignatureUtils {
    pub fn sign(secret_key: &SecretKey, message_hash: &Hash256) -> Signature {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*message_hash.as_bytes());

        let signature = secp.sign_ecdsa_recoverable(&message, secret_key);
        Signature::from_recoverable(&signature)
    }

    pub fn recover_public_key(message_hash: &Hash256, signature: &Signature) -> Result<PublicKey> {
        let secp = Secp256k1::verification_only();
        let message = Message::from_digest(*message_hash.as_bytes());
        let recoverable = signature.to_recoverable()?;

        let public_key = secp
            .recover_ecdsa(&message, &recoverable)
            .map_err(|e| LedgerError::Crypto(format!("Failed to recover public key: {}", e)))?;

        PublicKey::from_bytes(&public_key.serialize())
    }

    pub fn recover_address(message_hash: &Hash256, signature: &Signature) -> Result<Hash160> {
        Ok(Self::recover_public_key(message_hash, signature)?.address())
    }
}

#[cfg(test)]
const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

#[cfg(test)]
impl Signature {
    /// (r, n - s) with the flipped recovery id recovers the same key.
    pub(crate) fn malleated(&self) -> Signature {
        let bytes = self.to_bytes();
        let mut s = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = CURVE_ORDER[i] as i16 - bytes[32 + i] as i16 - borrow;
            borrow = if diff < 0 { 1 } else { 0 };
            s[i] = (diff + (borrow << 8)) as u8;
        }

        let mut malleated = bytes[..32].to_vec();
        malleated.extend_from_slice(&s);
        malleated.push(bytes[64] ^ 1);
        Signature(malleated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::PrivateKey;

    #[test]
    fn test_sign_and_recover() -> Result<()> {
        let private_key = PrivateKey::new()?;
        let message = Hash256::hash(b"test message");

        let signature = private_key.sign(&message);
        let address = SignatureUtils::recover_address(&message, &signature)?;

        assert_eq!(address, private_key.public_key().address());
        Ok(())
    }

    #[test]
    fn test_recover_other_message_gives_other_address() -> Result<()> {
        let private_key = PrivateKey::new()?;
        let signature = private_key.sign(&Hash256::hash(b"signed"));

        let address = SignatureUtils::recover_address(&Hash256::hash(b"tampered"), &signature)?;
        assert_ne!(address, private_key.public_key().address());
        Ok(())
    }

    #[test]
    fn test_signature_shape() -> Result<()> {
        assert!(Signature::from_bytes(&[0u8; 64]).is_err());

        let private_key = PrivateKey::new()?;
        let signature = private_key.sign(&Hash256::hash(b"shape"));
        let mut bytes = signature.to_bytes().to_vec();
        assert!(Signature::from_bytes(&bytes).is_ok());

        bytes[64] = 4;
        assert!(Signature::from_bytes(&bytes).is_err());
        Ok(())
    }

    #[test]
    fn test_high_s_signature_rejected() -> Result<()> {
        let private_key = PrivateKey::new()?;
        let message = Hash256::hash(b"malleable");
        let signature = private_key.sign(&message);
        let malleated = signature.malleated();

        assert_ne!(malleated, signature);
        assert!(matches!(malleated.check_shape(), Err(LedgerError::Crypto(_))));
        assert!(Signature::from_bytes(malleated.to_bytes()).is_err());
        Ok(())
    }
}
