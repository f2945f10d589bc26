//! Non-fungible token feature extension.

use crate::fx::secp256k1::{Input, OutputOwners};
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Authority to mint tokens of one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MintOutput {
    pub group_id: u32,
    pub owners: OutputOwners,
}

impl MintOutput {
    pub fn verify(&self) -> Result<()> {
        self.owners.verify()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferOutput {
    pub group_id: u32,
    pub payload: Vec<u8>,
    pub owners: OutputOwners,
}

impl TransferOutput {
    pub fn verify(&self) -> Result<()> {
        check_payload(&self.payload).map_err(LedgerError::InvalidOutput)?;
        self.owners.verify()
    }
}

fn check_payload(payload: &[u8]) -> std::result::Result<(), String> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(format!(
            "payload is {} bytes, maximum {}",
            payload.len(),
            MAX_PAYLOAD_SIZE
        ));
    }
    Ok(())
}

/// Mints one token per entry of `outputs`. The mint authority is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MintOperation {
    pub mint_input: Input,
    pub group_id: u32,
    pub payload: Vec<u8>,
    pub outputs: Vec<OutputOwners>,
}

impl MintOperation {
    pub fn verify(&self) -> Result<()> {
        self.mint_input
            .verify()
            .map_err(|e| LedgerError::InvalidOperation(e.to_string()))?;
        check_payload(&self.payload).map_err(LedgerError::InvalidOperation)?;

        if self.outputs.is_empty() {
            return Err(LedgerError::InvalidOperation("nft mint has no outputs".to_string()));
        }
        for owners in &self.outputs {
            owners
                .verify()
                .map_err(|e| LedgerError::InvalidOperation(e.to_string()))?;
        }
        Ok(())
    }

    pub fn verify_consumed(&self, consumed: &MintOutput) -> Result<()> {
        if consumed.group_id != self.group_id {
            return Err(LedgerError::InvalidOperation(format!(
                "mint for group {} consumes authority of group {}",
                self.group_id, consumed.group_id
            )));
        }
        Ok(())
    }

    pub fn outs(&self) -> Vec<TransferOutput> {
        self.outputs
            .iter()
            .map(|owners| TransferOutput {
                group_id: self.group_id,
                payload: self.payload.clone(),
                owners: owners.clone(),
            })
            .collect()
    }
}

/// Moves a token to new owners without changing what it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferOperation {
    pub input: Input,
    pub output: TransferOutput,
}

impl TransferOperation {
    pub fn verify(&self) -> Result<()> {
        self.input
            .verify()
            .map_err(|e| LedgerError::InvalidOperation(e.to_string()))?;
        self.output
            .verify()
            .map_err(|e| LedgerError::InvalidOperation(e.to_string()))
    }

    pub fn verify_consumed(&self, consumed: &TransferOutput) -> Result<()> {
        if consumed.group_id != self.output.group_id || consumed.payload != self.output.payload {
            return Err(LedgerError::InvalidOperation(
                "nft transfer changes group or payload".to_string(),
            ));
        }
        Ok(())
    }
}
