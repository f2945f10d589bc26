//! Feature extensions: the closed set of output, operation and credential
//! types a UTXO can carry, and the registry of extensions enabled on a chain.

pub mod nft;
pub mod secp256k1;

use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FxId {
    Secp256k1,
    Nft,
}

impl fmt::Display for FxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FxId::Secp256k1 => write!(f, "secp256k1fx"),
            FxId::Nft => write!(f, "nftfx"),
        }
    }
}

/// Extensions enabled on a chain. The position of an extension is the fx
/// index used on the wire by asset definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxRegistry {
    fxs: Vec<FxId>,
}

impl FxRegistry {
    pub fn new(fxs: Vec<FxId>) -> Self {
        Self { fxs }
    }

    pub fn get(&self, index: u32) -> Result<FxId> {
        self.fxs
            .get(index as usize)
            .copied()
            .ok_or(LedgerError::UnknownFx(index))
    }

    pub fn index_of(&self, fx: FxId) -> Option<u32> {
        self.fxs.iter().position(|f| *f == fx).map(|i| i as u32)
    }

    pub fn len(&self) -> usize {
        self.fxs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fxs.is_empty()
    }
}

impl Default for FxRegistry {
    fn default() -> Self {
        Self::new(vec![FxId::Secp256k1, FxId::Nft])
    }
}

/// Any state a UTXO can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Output {
    Transfer(secp256k1::TransferOutput),
    Mint(secp256k1::MintOutput),
    NftMint(nft::MintOutput),
    NftTransfer(nft::TransferOutput),
}

impl Output {
    pub fn fx(&self) -> FxId {
        match self {
            Output::Transfer(_) | Output::Mint(_) => FxId::Secp256k1,
            Output::NftMint(_) | Output::NftTransfer(_) => FxId::Nft,
        }
    }

    pub fn verify(&self) -> Result<()> {
        match self {
            Output::Transfer(out) => out.verify(),
            Output::Mint(out) => out.verify(),
            Output::NftMint(out) => out.verify(),
            Output::NftTransfer(out) => out.verify(),
        }
    }

    pub fn owners(&self) -> &secp256k1::OutputOwners {
        match self {
            Output::Transfer(out) => &out.owners,
            Output::Mint(out) => &out.owners,
            Output::NftMint(out) => &out.owners,
            Output::NftTransfer(out) => &out.owners,
        }
    }

    /// Fungible amount, if this output carries one.
    pub fn amount(&self) -> Option<u64> {
        match self {
            Output::Transfer(out) => Some(out.amount),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Output::Transfer(_) => "transfer output",
            Output::Mint(_) => "mint output",
            Output::NftMint(_) => "nft mint output",
            Output::NftTransfer(_) => "nft transfer output",
        }
    }
}

/// A state transition on non-transfer UTXOs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    SecpMint(secp256k1::MintOperation),
    NftMint(nft::MintOperation),
    NftTransfer(nft::TransferOperation),
}

impl Op {
    pub fn fx(&self) -> FxId {
        match self {
            Op::SecpMint(_) => FxId::Secp256k1,
            Op::NftMint(_) | Op::NftTransfer(_) => FxId::Nft,
        }
    }

    pub fn verify(&self) -> Result<()> {
        match self {
            Op::SecpMint(op) => op.verify(),
            Op::NftMint(op) => op.verify(),
            Op::NftTransfer(op) => op.verify(),
        }
    }

    /// Signature indices authorizing the consumed output.
    pub fn input(&self) -> &secp256k1::Input {
        match self {
            Op::SecpMint(op) => &op.mint_input,
            Op::NftMint(op) => &op.mint_input,
            Op::NftTransfer(op) => &op.input,
        }
    }

    /// Every operation consumes exactly one output; its `outs` replace it.
    pub fn verify_utxo_count(&self, count: usize) -> Result<()> {
        if count != 1 {
            return Err(LedgerError::InvalidOperation(format!(
                "{} operation consumes {} utxos, expected 1",
                self.fx(),
                count
            )));
        }
        Ok(())
    }

    /// Checks the operation against the single output it consumes.
    pub fn verify_consumed(&self, consumed: &Output) -> Result<()> {
        match (self, consumed) {
            (Op::SecpMint(op), Output::Mint(out)) => op.verify_consumed(out),
            (Op::NftMint(op), Output::NftMint(out)) => op.verify_consumed(out),
            (Op::NftTransfer(op), Output::NftTransfer(out)) => op.verify_consumed(out),
            (_, out) => Err(LedgerError::WrongUtxoType(format!(
                "operation cannot consume a {}",
                out.kind()
            ))),
        }
    }

    pub fn outs(&self) -> Vec<Output> {
        match self {
            Op::SecpMint(op) => vec![
                Output::Mint(op.mint_output.clone()),
                Output::Transfer(op.transfer_output.clone()),
            ],
            Op::NftMint(op) => op.outs().into_iter().map(Output::NftTransfer).collect(),
            Op::NftTransfer(op) => vec![Output::NftTransfer(op.output.clone())],
        }
    }
}

/// Proof data for one verifiable input group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Credential {
    Secp256k1(secp256k1::Credential),
    Nft(secp256k1::Credential),
}

impl Credential {
    pub fn fx(&self) -> FxId {
        match self {
            Credential::Secp256k1(_) => FxId::Secp256k1,
            Credential::Nft(_) => FxId::Nft,
        }
    }

    pub fn verify(&self) -> Result<()> {
        self.signatures().verify()
    }

    pub fn signatures(&self) -> &secp256k1::Credential {
        match self {
            Credential::Secp256k1(cred) | Credential::Nft(cred) => cred,
        }
    }
}
