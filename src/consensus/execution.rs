//! Stateful verification. Reads the UTXO set and shared memory, never writes
//! them, and describes the changes accepting the transaction would make.

use crate::codec::Codec;
use crate::config::ChainParams;
use crate::consensus::fees::{required_fee, Flow};
use crate::consensus::validation::Verified;
use crate::core::components::{AssetId, ChainId, TransferableInput, TxId, Utxo, UtxoId};
use crate::core::transaction::{SignedTx, UnsignedTx};
use crate::core::utxo::{AssetDefinition, UtxoStore};
use crate::crypto::hash::Hash256;
use crate::fx::{Credential, FxId, FxRegistry, Output};
use crate::shared_memory::{self, Element, Requests, SharedMemory};
use crate::{LedgerError, Result};
use std::collections::{BTreeMap, HashSet};

/// Everything accepting one transaction changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationDescriptor {
    pub tx_id: TxId,
    /// Local UTXOs to delete.
    pub consumed: Vec<Utxo>,
    /// Local UTXOs to insert.
    pub produced: Vec<Utxo>,
    pub new_asset: Option<(AssetId, AssetDefinition)>,
    /// Shared-memory requests keyed by peer chain.
    pub shared: BTreeMap<ChainId, Requests>,
    pub burned: BTreeMap<AssetId, u64>,
}

/// Read-only state a transaction is executed against.
pub struct StateView<'a> {
    pub params: &'a ChainParams,
    pub codec: &'a Codec,
    pub fxs: &'a FxRegistry,
    pub utxos: &'a dyn UtxoStore,
    pub shared: &'a dyn SharedMemory,
    /// Transactions submitted to this chain but not yet accepted.
    pub pending: &'a HashSet<TxId>,
    /// Unix seconds, compared against output time-locks.
    pub now: u64,
}

pub fn semantic_verify(tx: &Verified<SignedTx>, view: &StateView<'_>) -> Result<MutationDescriptor> {
    view.execute(tx)
}

impl<'a> StateView<'a> {
    pub fn execute(&self, tx: &Verified<SignedTx>) -> Result<MutationDescriptor> {
        let tx_id = tx.id();
        let unsigned = tx.unsigned();
        let base = unsigned.base();
        let message = tx.message();
        let mut credentials = tx.credentials().iter();
        let mut next_credential = || {
            credentials.next().ok_or_else(|| LedgerError::WrongNumberOfCredentials {
                expected: unsigned.credential_count(),
                actual: tx.credentials().len(),
            })
        };

        let mut flow = Flow::new();
        let mut consumed = Vec::new();
        let mut shared = BTreeMap::new();

        for input in &base.ins {
            let utxo = self.local_utxo(&input.utxo_id)?;
            let amount = self.verify_transfer_input(input, &utxo, next_credential()?, &message)?;
            flow.consume(input.asset, amount)?;
            consumed.push(utxo);
        }

        match unsigned {
            UnsignedTx::Base(_) | UnsignedTx::CreateAsset(_) | UnsignedTx::Export(_) => {}
            UnsignedTx::Operation(operation_tx) => {
                for operation in &operation_tx.ops {
                    let credential = next_credential()?;
                    for utxo_id in &operation.utxo_ids {
                        let utxo = self.local_utxo(utxo_id)?;
                        if utxo.asset != operation.asset {
                            return Err(LedgerError::AssetIdMismatch {
                                expected: utxo.asset,
                                actual: operation.asset,
                            });
                        }
                        self.verify_fx(&utxo, credential.fx())?;
                        operation.op.verify_consumed(&utxo.out)?;
                        utxo.out.owners().authorize(
                            operation.op.input(),
                            credential.signatures(),
                            &message,
                            self.now,
                        )?;
                        consumed.push(utxo);
                    }
                }
            }
            UnsignedTx::Import(import) => {
                let keys: Vec<Vec<u8>> = import
                    .imported_ins
                    .iter()
                    .map(|input| input.utxo_id.input_id().as_bytes().to_vec())
                    .collect();
                let values = self.shared.get(&import.source_chain, &keys)?;

                for ((input, key), value) in import.imported_ins.iter().zip(keys).zip(values) {
                    let utxo: Utxo = self.codec.decode(&value)?;
                    if utxo.utxo_id != input.utxo_id {
                        return Err(LedgerError::WrongUtxoType(format!(
                            "shared element {} holds utxo {}",
                            input.utxo_id, utxo.utxo_id
                        )));
                    }

                    let amount = self.verify_transfer_input(input, &utxo, next_credential()?, &message)?;
                    flow.consume(input.asset, amount)?;
                    shared_memory::consume(&mut shared, import.source_chain, key);
                }
            }
        }

        for output in unsigned.produced_outputs() {
            flow.produce(output.asset, output.amount())?;
        }
        flow.check(&self.params.fee_asset, required_fee(unsigned, self.params))?;

        let mut produced = Vec::new();
        let mut new_asset = None;
        let mut index: u32 = 0;
        let mut next_id = || -> Result<UtxoId> {
            let id = UtxoId::new(tx_id, index);
            index = index.checked_add(1).ok_or(LedgerError::Overflow)?;
            Ok(id)
        };

        for output in &base.outs {
            produced.push(Utxo {
                utxo_id: next_id()?,
                asset: output.asset,
                out: Output::Transfer(output.out.clone()),
            });
        }

        match unsigned {
            UnsignedTx::Base(_) | UnsignedTx::Import(_) => {}
            UnsignedTx::CreateAsset(create) => {
                let mut fxs = Vec::with_capacity(create.states.len());
                for state in &create.states {
                    fxs.push(self.fxs.get(state.fx_index)?);
                    for out in &state.outs {
                        produced.push(Utxo { utxo_id: next_id()?, asset: tx_id, out: out.clone() });
                    }
                }
                new_asset = Some((
                    tx_id,
                    AssetDefinition {
                        name: create.name.clone(),
                        symbol: create.symbol.clone(),
                        denomination: create.denomination,
                        fxs,
                    },
                ));
            }
            UnsignedTx::Operation(operation_tx) => {
                for operation in &operation_tx.ops {
                    for out in operation.op.outs() {
                        produced.push(Utxo { utxo_id: next_id()?, asset: operation.asset, out });
                    }
                }
            }
            UnsignedTx::Export(export) => {
                for output in &export.exported_outs {
                    let utxo = Utxo {
                        utxo_id: next_id()?,
                        asset: output.asset,
                        out: Output::Transfer(output.out.clone()),
                    };
                    let element = Element {
                        key: utxo.input_id().as_bytes().to_vec(),
                        value: self.codec.encode(&utxo)?,
                        traits: utxo.addresses().iter().map(|a| a.as_bytes().to_vec()).collect(),
                    };
                    shared_memory::stage(&mut shared, export.destination_chain, element);
                }
            }
        }

        let mut burned = BTreeMap::new();
        for asset in flow.assets() {
            burned.insert(asset, flow.burned(&asset)?);
        }

        log::debug!(
            "✅ {} tx {} passed semantic verification: {} consumed, {} produced",
            unsigned.name(),
            tx_id,
            consumed.len(),
            produced.len()
        );

        Ok(MutationDescriptor { tx_id, consumed, produced, new_asset, shared, burned })
    }

    fn local_utxo(&self, utxo_id: &UtxoId) -> Result<Utxo> {
        let id = utxo_id.input_id();
        self.utxos.get_utxo(&id)?.ok_or(LedgerError::MissingUtxo {
            id,
            temporary: self.pending.contains(&utxo_id.tx_id),
        })
    }

    /// The UTXO's fx must match the credential and be one its asset allows.
    fn verify_fx(&self, utxo: &Utxo, credential_fx: FxId) -> Result<()> {
        let fx = utxo.out.fx();
        if fx != credential_fx {
            return Err(LedgerError::UnsupportedFx(format!(
                "{} spent with a {} credential",
                utxo.out.kind(),
                credential_fx
            )));
        }

        let definition = self.asset(&utxo.asset)?;
        if !definition.supports(fx) {
            return Err(LedgerError::UnsupportedFx(format!(
                "asset {} was not created with {}",
                utxo.asset, fx
            )));
        }
        Ok(())
    }

    fn asset(&self, id: &Hash256) -> Result<AssetDefinition> {
        self.utxos.get_asset(id)?.ok_or(LedgerError::MissingAsset {
            id: *id,
            temporary: self.pending.contains(id),
        })
    }

    /// Checks a fungible input against the UTXO it spends and returns the
    /// UTXO's amount.
    fn verify_transfer_input(
        &self,
        input: &TransferableInput,
        utxo: &Utxo,
        credential: &Credential,
        message: &Hash256,
    ) -> Result<u64> {
        if utxo.asset != input.asset {
            return Err(LedgerError::AssetIdMismatch {
                expected: utxo.asset,
                actual: input.asset,
            });
        }

        self.verify_fx(utxo, credential.fx())?;

        let out = match &utxo.out {
            Output::Transfer(out) => out,
            other => {
                return Err(LedgerError::WrongUtxoType(format!(
                    "input spends a {}",
                    other.kind()
                )))
            }
        };

        if input.amount() != out.amount {
            return Err(LedgerError::InputAmountMismatch {
                claimed: input.amount(),
                actual: out.amount,
            });
        }

        out.owners.authorize(&input.input.input, credential.signatures(), message, self.now)?;
        Ok(out.amount)
    }
}
