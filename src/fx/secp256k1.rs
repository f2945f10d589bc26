//! Threshold-signature feature extension: fungible transfer outputs, mint
//! authorities and the mint operation.

use crate::crypto::hash::{Hash160, Hash256};
use crate::crypto::signatures::{Signature, SignatureUtils};
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Ownership predicate: `threshold` of `addrs` must sign once `locktime` has passed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputOwners {
    pub locktime: u64,
    pub threshold: u32,
    pub addrs: Vec<Hash160>,
}

impl OutputOwners {
    pub fn new(locktime: u64, threshold: u32, mut addrs: Vec<Hash160>) -> Self {
        addrs.sort();
        Self { locktime, threshold, addrs }
    }

    /// Single-key owner with no time-lock.
    pub fn single(address: Hash160) -> Self {
        Self::new(0, 1, vec![address])
    }

    pub fn verify(&self) -> Result<()> {
        if self.threshold as usize > self.addrs.len() {
            return Err(LedgerError::InvalidOutput(format!(
                "threshold {} exceeds {} addresses",
                self.threshold,
                self.addrs.len()
            )));
        }

        if self.threshold == 0 && !self.addrs.is_empty() {
            return Err(LedgerError::InvalidOutput(
                "zero threshold with addresses is unspendable".to_string(),
            ));
        }

        if !self.addrs.windows(2).all(|w| w[0] < w[1]) {
            return Err(LedgerError::InvalidOutput(
                "addresses are not sorted and unique".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks that `credential` satisfies this predicate for `input`.
    /// `message` is the hash of the unsigned transaction bytes.
    pub fn authorize(
        &self,
        input: &Input,
        credential: &Credential,
        message: &Hash256,
        now: u64,
    ) -> Result<()> {
        if self.locktime > now {
            return Err(LedgerError::Locked { locktime: self.locktime, now });
        }

        let needed = self.threshold as usize;
        if input.sig_indices.len() != needed {
            return Err(LedgerError::Unauthorized(format!(
                "{} signature indices, threshold is {}",
                input.sig_indices.len(),
                needed
            )));
        }

        if credential.sigs.len() != input.sig_indices.len() {
            return Err(LedgerError::InvalidCredential(format!(
                "{} signatures for {} signature indices",
                credential.sigs.len(),
                input.sig_indices.len()
            )));
        }

        for (index, signature) in input.sig_indices.iter().zip(&credential.sigs) {
            let expected = self.addrs.get(*index as usize).ok_or_else(|| {
                LedgerError::Unauthorized(format!("signature index {} out of range", index))
            })?;

            let signer = SignatureUtils::recover_address(message, signature)
                .map_err(|e| LedgerError::InvalidCredential(e.to_string()))?;

            if signer != *expected {
                return Err(LedgerError::Unauthorized(format!(
                    "signature {} does not match owner {}",
                    index, expected
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferOutput {
    pub amount: u64,
    pub owners: OutputOwners,
}

impl TransferOutput {
    pub fn verify(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(LedgerError::InvalidOutput("output has no value".to_string()));
        }
        self.owners.verify()
    }
}

/// Authority to mint more of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MintOutput {
    pub owners: OutputOwners,
}

impl MintOutput {
    pub fn verify(&self) -> Result<()> {
        self.owners.verify()
    }
}

/// Indices into the spent output's address list, one per signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Input {
    pub sig_indices: Vec<u32>,
}

impl Input {
    pub fn new(sig_indices: Vec<u32>) -> Self {
        Self { sig_indices }
    }

    pub fn verify(&self) -> Result<()> {
        if !self.sig_indices.windows(2).all(|w| w[0] < w[1]) {
            return Err(LedgerError::InvalidInput(
                "signature indices are not sorted and unique".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferInput {
    pub amount: u64,
    pub input: Input,
}

impl TransferInput {
    pub fn verify(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(LedgerError::InvalidInput("input has no value".to_string()));
        }
        self.input.verify()
    }
}

/// Consumes a mint authority and produces fresh supply plus the renewed authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MintOperation {
    pub mint_input: Input,
    pub mint_output: MintOutput,
    pub transfer_output: TransferOutput,
}

impl MintOperation {
    pub fn verify(&self) -> Result<()> {
        self.mint_input
            .verify()
            .map_err(|e| LedgerError::InvalidOperation(e.to_string()))?;
        self.mint_output
            .verify()
            .map_err(|e| LedgerError::InvalidOperation(e.to_string()))?;
        self.transfer_output
            .verify()
            .map_err(|e| LedgerError::InvalidOperation(e.to_string()))
    }

    /// The renewed authority must keep the consumed authority's owners.
    pub fn verify_consumed(&self, consumed: &MintOutput) -> Result<()> {
        if consumed.owners != self.mint_output.owners {
            return Err(LedgerError::InvalidOperation(
                "mint operation changes the mint authority".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub sigs: Vec<Signature>,
}

impl Credential {
    pub fn verify(&self) -> Result<()> {
        for signature in &self.sigs {
            signature
                .check_shape()
                .map_err(|e| LedgerError::NilOrInvalidCredential(e.to_string()))?;
        }
        Ok(())
    }
}
