//! Identifiers and the transferable input/output building blocks shared by
//! every transaction type.

use crate::codec::Codec;
use crate::crypto::hash::{Hash160, Hash256};
use crate::fx::secp256k1::{TransferInput, TransferOutput};
use crate::fx::Output;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub type TxId = Hash256;
pub type AssetId = Hash256;
pub type ChainId = Hash256;
/// Store key of a UTXO, derived from its `UtxoId`.
pub type InputId = Hash256;
pub type Address = Hash160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtxoId {
    pub tx_id: TxId,
    pub output_index: u32,
}

impl UtxoId {
    pub const fn new(tx_id: TxId, output_index: u32) -> Self {
        Self { tx_id, output_index }
    }

    pub fn input_id(&self) -> InputId {
        self.tx_id.prefix(self.output_index as u64)
    }
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.output_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub utxo_id: UtxoId,
    pub asset: AssetId,
    pub out: Output,
}

impl Utxo {
    pub fn input_id(&self) -> InputId {
        self.utxo_id.input_id()
    }

    pub fn addresses(&self) -> &[Address] {
        &self.out.owners().addrs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferableInput {
    pub utxo_id: UtxoId,
    pub asset: AssetId,
    pub input: TransferInput,
}

impl TransferableInput {
    pub fn amount(&self) -> u64 {
        self.input.amount
    }

    pub fn verify(&self) -> Result<()> {
        self.input.verify()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferableOutput {
    pub asset: AssetId,
    pub out: TransferOutput,
}

impl TransferableOutput {
    pub fn amount(&self) -> u64 {
        self.out.amount
    }

    pub fn verify(&self) -> Result<()> {
        self.out.verify()
    }
}

/// Canonical output order: asset id, then the encoded output.
fn compare_outputs(
    codec: &Codec,
    a: &TransferableOutput,
    b: &TransferableOutput,
) -> Result<Ordering> {
    match a.asset.cmp(&b.asset) {
        Ordering::Equal => Ok(codec.encode(&a.out)?.cmp(&codec.encode(&b.out)?)),
        other => Ok(other),
    }
}

/// Duplicates are allowed: two identical payments are legitimate.
pub fn is_sorted_outputs(codec: &Codec, outs: &[TransferableOutput]) -> Result<bool> {
    for pair in outs.windows(2) {
        if compare_outputs(codec, &pair[0], &pair[1])? == Ordering::Greater {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn sort_outputs(codec: &Codec, outs: &mut [TransferableOutput]) -> Result<()> {
    let mut keyed = Vec::with_capacity(outs.len());
    for out in outs.iter() {
        keyed.push((out.asset, codec.encode(&out.out)?, out.clone()));
    }
    keyed.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    for (slot, (_, _, out)) in outs.iter_mut().zip(keyed) {
        *slot = out;
    }
    Ok(())
}

pub fn is_sorted_and_unique_inputs(ins: &[TransferableInput]) -> bool {
    ins.windows(2).all(|pair| pair[0].utxo_id < pair[1].utxo_id)
}

pub fn sort_inputs(ins: &mut [TransferableInput]) {
    ins.sort_by_key(|input| input.utxo_id);
}

/// Strictly increasing by encoded bytes.
pub fn is_sorted_and_unique_encoded<T: Serialize>(codec: &Codec, items: &[T]) -> Result<bool> {
    let mut previous: Option<Vec<u8>> = None;
    for item in items {
        let bytes = codec.encode(item)?;
        if let Some(prev) = &previous {
            if *prev >= bytes {
                return Ok(false);
            }
        }
        previous = Some(bytes);
    }
    Ok(true)
}
