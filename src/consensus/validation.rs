use crate::codec::Codec;
use crate::config::ChainParams;
use crate::consensus::fees::{required_fee, Flow};
use crate::core::components::{
    is_sorted_and_unique_encoded, is_sorted_and_unique_inputs, is_sorted_outputs, TransferableInput,
    TransferableOutput,
};
use crate::core::transaction::{BaseTx, CreateAssetTx, OperationTx, SignedTx, UnsignedTx};
use crate::fx::FxRegistry;
use crate::{LedgerError, Result};
use std::collections::HashSet;
use std::ops::Deref;

/// A value that passed syntactic verification. Only the verifier can
/// construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified<T>(T);

impl<T> Verified<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Verified<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Stateless transaction checks.
#[derive(Debug, Clone)]
pub struct TxValidator {
    params: ChainParams,
    codec: Codec,
    fxs: FxRegistry,
}

impl TxValidator {
    pub fn new(params: ChainParams, codec: Codec, fxs: FxRegistry) -> Self {
        Self { params, codec, fxs }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Runs every check in order and stops at the first failure.
    pub fn verify(&self, tx: SignedTx) -> Result<Verified<SignedTx>> {
        let unsigned = tx.unsigned();
        let base = unsigned.base();

        self.validate_ids(base)?;
        self.validate_memo(base)?;
        self.validate_outputs(unsigned)?;
        self.validate_inputs(unsigned)?;
        self.validate_flow(unsigned)?;
        self.validate_variant(unsigned)?;
        self.validate_credentials(&tx)?;

        log::debug!("✅ {} tx {} passed syntactic verification", unsigned.name(), tx.id());
        Ok(Verified(tx))
    }

    fn validate_ids(&self, base: &BaseTx) -> Result<()> {
        if base.network_id != self.params.network_id {
            return Err(LedgerError::WrongNetworkId {
                expected: self.params.network_id,
                actual: base.network_id,
            });
        }

        if base.chain_id != self.params.chain_id {
            return Err(LedgerError::WrongChainId {
                expected: self.params.chain_id,
                actual: base.chain_id,
            });
        }

        Ok(())
    }

    fn validate_memo(&self, base: &BaseTx) -> Result<()> {
        if base.memo.len() > self.params.max_memo_size {
            return Err(LedgerError::MemoTooLarge {
                size: base.memo.len(),
                max: self.params.max_memo_size,
            });
        }
        Ok(())
    }

    fn validate_outputs(&self, tx: &UnsignedTx) -> Result<()> {
        for output in tx.produced_outputs() {
            output.verify()?;
        }

        self.check_output_order(&tx.base().outs)?;
        if let UnsignedTx::Export(export) = tx {
            self.check_output_order(&export.exported_outs)?;
        }
        Ok(())
    }

    fn check_output_order(&self, outs: &[TransferableOutput]) -> Result<()> {
        if !is_sorted_outputs(&self.codec, outs)? {
            return Err(LedgerError::OutputsNotSorted);
        }
        Ok(())
    }

    fn validate_inputs(&self, tx: &UnsignedTx) -> Result<()> {
        for input in tx.consumed_inputs() {
            input.verify()?;
        }

        Self::check_input_order(&tx.base().ins)?;
        if let UnsignedTx::Import(import) = tx {
            Self::check_input_order(&import.imported_ins)?;
        }
        Ok(())
    }

    fn check_input_order(ins: &[TransferableInput]) -> Result<()> {
        if !is_sorted_and_unique_inputs(ins) {
            return Err(LedgerError::InputsNotSortedOrDuplicate);
        }
        Ok(())
    }

    fn validate_flow(&self, tx: &UnsignedTx) -> Result<()> {
        let flow = Flow::of(tx)?;
        flow.check(&self.params.fee_asset, required_fee(tx, &self.params))
    }

    fn validate_variant(&self, tx: &UnsignedTx) -> Result<()> {
        match tx {
            UnsignedTx::Base(_) => Ok(()),
            UnsignedTx::CreateAsset(create) => self.validate_create_asset(create),
            UnsignedTx::Operation(operation) => self.validate_operations(operation),
            UnsignedTx::Export(export) => {
                if export.exported_outs.is_empty() {
                    return Err(LedgerError::InvalidTx("export has no exported outputs".to_string()));
                }
                if export.destination_chain == self.params.chain_id {
                    return Err(LedgerError::InvalidTx("export to own chain".to_string()));
                }
                Ok(())
            }
            UnsignedTx::Import(import) => {
                if import.imported_ins.is_empty() {
                    return Err(LedgerError::InvalidTx("import has no imported inputs".to_string()));
                }
                if import.source_chain == self.params.chain_id {
                    return Err(LedgerError::InvalidTx("import from own chain".to_string()));
                }
                Ok(())
            }
        }
    }

    fn validate_create_asset(&self, tx: &CreateAssetTx) -> Result<()> {
        let name = &tx.name;
        if name.is_empty() || name.len() > self.params.max_name_len {
            return Err(LedgerError::InvalidAssetDefinition(format!(
                "name length {} outside 1..={}",
                name.len(),
                self.params.max_name_len
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
            || name.starts_with(' ')
            || name.ends_with(' ')
            || name.contains("  ")
        {
            return Err(LedgerError::InvalidAssetDefinition(format!("malformed name {:?}", name)));
        }

        let symbol = &tx.symbol;
        if symbol.is_empty() || symbol.len() > self.params.max_symbol_len {
            return Err(LedgerError::InvalidAssetDefinition(format!(
                "symbol length {} outside 1..={}",
                symbol.len(),
                self.params.max_symbol_len
            )));
        }
        if !symbol.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(LedgerError::InvalidAssetDefinition(format!("malformed symbol {:?}", symbol)));
        }

        if tx.denomination > self.params.max_denomination {
            return Err(LedgerError::InvalidAssetDefinition(format!(
                "denomination {} exceeds {}",
                tx.denomination, self.params.max_denomination
            )));
        }

        if tx.states.is_empty() {
            return Err(LedgerError::InvalidAssetDefinition("no initial states".to_string()));
        }
        if !tx.states.windows(2).all(|w| w[0].fx_index < w[1].fx_index) {
            return Err(LedgerError::InitialStatesNotSortedOrDuplicate);
        }

        for state in &tx.states {
            let fx = self.fxs.get(state.fx_index)?;
            for out in &state.outs {
                if out.fx() != fx {
                    return Err(LedgerError::InvalidAssetDefinition(format!(
                        "{} in initial state of {}",
                        out.kind(),
                        fx
                    )));
                }
                out.verify()?;
            }
            if !is_sorted_and_unique_encoded(&self.codec, &state.outs)? {
                return Err(LedgerError::InitialStatesNotSortedOrDuplicate);
            }
        }

        Ok(())
    }

    fn validate_operations(&self, tx: &OperationTx) -> Result<()> {
        if tx.ops.is_empty() {
            return Err(LedgerError::InvalidTx("operation tx has no operations".to_string()));
        }

        let mut spent: HashSet<_> = tx.base.ins.iter().map(|input| input.utxo_id).collect();

        for operation in &tx.ops {
            operation.op.verify()?;
            operation.op.verify_utxo_count(operation.utxo_ids.len())?;
            if !operation.utxo_ids.windows(2).all(|w| w[0] < w[1]) {
                return Err(LedgerError::InvalidOperation(
                    "utxo ids are not sorted and unique".to_string(),
                ));
            }

            for utxo_id in &operation.utxo_ids {
                if !spent.insert(*utxo_id) {
                    return Err(LedgerError::DoubleSpend(utxo_id.input_id()));
                }
            }
        }

        if !is_sorted_and_unique_encoded(&self.codec, &tx.ops)? {
            return Err(LedgerError::InvalidOperation(
                "operations are not sorted and unique".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_credentials(&self, tx: &SignedTx) -> Result<()> {
        let expected = tx.unsigned().credential_fxs();
        let credentials = tx.credentials();

        if credentials.len() != expected.len() {
            return Err(LedgerError::WrongNumberOfCredentials {
                expected: expected.len(),
                actual: credentials.len(),
            });
        }

        for (slot, (credential, fx)) in credentials.iter().zip(&expected).enumerate() {
            if credential.fx() != *fx {
                return Err(LedgerError::NilOrInvalidCredential(format!(
                    "credential {} is {}, expected {}",
                    slot,
                    credential.fx(),
                    fx
                )));
            }
            credential.verify()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::components::{sort_outputs, UtxoId};
    use crate::core::transaction::{ExportTx, InitialState, ImportTx, Operation};
    use crate::crypto::hash::Hash256;
    use crate::crypto::keys::PrivateKey;
    use crate::fx::secp256k1::{Input, MintOperation, MintOutput, OutputOwners, TransferInput, TransferOutput};
    use crate::fx::{Credential, Op, Output};

    fn params() -> ChainParams {
        ChainParams {
            network_id: 7,
            chain_id: Hash256::hash(b"X"),
            fee_asset: Hash256::hash(b"fee"),
            tx_fee: 2,
            create_asset_fee: 10,
            ..ChainParams::default()
        }
    }

    fn validator() -> TxValidator {
        TxValidator::new(params(), Codec::default(), FxRegistry::default())
    }

    fn input(tx: &[u8], index: u32, amount: u64) -> TransferableInput {
        TransferableInput {
            utxo_id: UtxoId::new(Hash256::hash(tx), index),
            asset: params().fee_asset,
            input: TransferInput { amount, input: Input::new(vec![0]) },
        }
    }

    fn output(owner: u8, amount: u64) -> TransferableOutput {
        TransferableOutput {
            asset: params().fee_asset,
            out: TransferOutput {
                amount,
                owners: OutputOwners::single(crate::crypto::hash::Hash160::new([owner; 20])),
            },
        }
    }

    fn base(ins: Vec<TransferableInput>, outs: Vec<TransferableOutput>) -> BaseTx {
        BaseTx { ins, outs, ..BaseTx::new(params().network_id, params().chain_id) }
    }

    fn signed(unsigned: UnsignedTx) -> Result<SignedTx> {
        let key = PrivateKey::new()?;
        let signers = vec![vec![key]; unsigned.credential_count()];
        SignedTx::sign(&Codec::default(), unsigned, &signers)
    }

    #[test]
    fn test_valid_base_tx() -> Result<()> {
        let tx = signed(UnsignedTx::Base(base(vec![input(b"a", 0, 20_000)], vec![output(1, 10_000)])))?;
        let verified = validator().verify(tx.clone())?;
        assert_eq!(verified.id(), tx.id());
        Ok(())
    }

    #[test]
    fn test_verification_is_idempotent() -> Result<()> {
        let tx = signed(UnsignedTx::Base(base(vec![input(b"a", 0, 100)], vec![output(1, 98)])))?;

        let first = validator().verify(tx.clone())?;
        let second = validator().verify(first.clone().into_inner())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_duplicate_inputs_rejected() -> Result<()> {
        let tx = signed(UnsignedTx::Base(base(
            vec![input(b"a", 0, 100), input(b"a", 0, 100)],
            vec![output(1, 10)],
        )))?;

        assert!(matches!(validator().verify(tx), Err(LedgerError::InputsNotSortedOrDuplicate)));
        Ok(())
    }

    #[test]
    fn test_unsorted_outputs_rejected() -> Result<()> {
        let codec = Codec::default();
        let mut outs = vec![output(1, 10), output(2, 10)];
        sort_outputs(&codec, &mut outs)?;
        outs.reverse();

        let tx = signed(UnsignedTx::Base(base(vec![input(b"a", 0, 100)], outs)))?;
        assert!(matches!(validator().verify(tx), Err(LedgerError::OutputsNotSorted)));
        Ok(())
    }

    #[test]
    fn test_fee_shortfall_rejected() -> Result<()> {
        let tx = signed(UnsignedTx::Base(base(vec![input(b"a", 0, 10_001)], vec![output(1, 10_000)])))?;

        assert!(matches!(
            validator().verify(tx),
            Err(LedgerError::InsufficientFunds { required: 10_002, available: 10_001, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_wrong_ids_and_memo() -> Result<()> {
        let mut wrong_network = base(vec![input(b"a", 0, 100)], vec![]);
        wrong_network.network_id = 8;
        let result = validator().verify(signed(UnsignedTx::Base(wrong_network))?);
        assert!(matches!(result, Err(LedgerError::WrongNetworkId { expected: 7, actual: 8 })));

        let mut wrong_chain = base(vec![input(b"a", 0, 100)], vec![]);
        wrong_chain.chain_id = Hash256::hash(b"Y");
        let result = validator().verify(signed(UnsignedTx::Base(wrong_chain))?);
        assert!(matches!(result, Err(LedgerError::WrongChainId { .. })));

        let mut memo = base(vec![input(b"a", 0, 100)], vec![]);
        memo.memo = vec![0u8; params().max_memo_size + 1];
        let result = validator().verify(signed(UnsignedTx::Base(memo))?);
        assert!(matches!(result, Err(LedgerError::MemoTooLarge { .. })));
        Ok(())
    }

    #[test]
    fn test_memo_at_limit_and_no_outputs() -> Result<()> {
        let mut tx = base(vec![input(b"a", 0, 100)], vec![]);
        tx.memo = vec![0u8; params().max_memo_size];

        validator().verify(signed(UnsignedTx::Base(tx))?)?;
        Ok(())
    }

    #[test]
    fn test_credential_count() -> Result<()> {
        let unsigned = UnsignedTx::Base(base(vec![input(b"a", 0, 100)], vec![]));
        let tx = SignedTx::new(&Codec::default(), unsigned, vec![])?;

        assert!(matches!(
            validator().verify(tx),
            Err(LedgerError::WrongNumberOfCredentials { expected: 1, actual: 0 })
        ));
        Ok(())
    }

    #[test]
    fn test_malformed_signature_rejected() -> Result<()> {
        let codec = Codec::default();
        let unsigned = UnsignedTx::Base(base(vec![input(b"a", 0, 100)], vec![]));
        // Decoding accepts any byte string; only the verifier checks the shape.
        let short: crate::crypto::Signature = codec.decode(&codec.encode(&vec![0u8; 64])?)?;
        let credential = Credential::Secp256k1(crate::fx::secp256k1::Credential { sigs: vec![short] });
        let tx = SignedTx::new(&Codec::default(), unsigned, vec![credential])?;

        assert!(matches!(validator().verify(tx), Err(LedgerError::NilOrInvalidCredential(_))));
        Ok(())
    }

    #[test]
    fn test_create_asset_shape() -> Result<()> {
        let owners = OutputOwners::single(crate::crypto::hash::Hash160::new([1u8; 20]));
        let create = |name: &str, symbol: &str, fx_index: u32| {
            UnsignedTx::CreateAsset(CreateAssetTx {
                base: base(vec![input(b"a", 0, 10)], vec![]),
                name: name.to_string(),
                symbol: symbol.to_string(),
                denomination: 0,
                states: vec![InitialState {
                    fx_index,
                    outs: vec![Output::Mint(MintOutput { owners: owners.clone() })],
                }],
            })
        };

        validator().verify(signed(create("Gold", "GLD", 0))?)?;

        let bad_symbol = validator().verify(signed(create("Gold", "gld", 0))?);
        assert!(matches!(bad_symbol, Err(LedgerError::InvalidAssetDefinition(_))));

        let bad_name = validator().verify(signed(create(" Gold", "GLD", 0))?);
        assert!(matches!(bad_name, Err(LedgerError::InvalidAssetDefinition(_))));

        let unknown_fx = validator().verify(signed(create("Gold", "GLD", 9))?);
        assert!(matches!(unknown_fx, Err(LedgerError::UnknownFx(9))));

        // A secp256k1 mint output under the nft extension.
        let wrong_fx = validator().verify(signed(create("Gold", "GLD", 1))?);
        assert!(matches!(wrong_fx, Err(LedgerError::InvalidAssetDefinition(_))));
        Ok(())
    }

    #[test]
    fn test_operation_double_spend_with_base_input() -> Result<()> {
        let owners = OutputOwners::single(crate::crypto::hash::Hash160::new([1u8; 20]));
        let fee_input = input(b"a", 0, 10);
        let unsigned = UnsignedTx::Operation(OperationTx {
            base: base(vec![fee_input.clone()], vec![]),
            ops: vec![Operation {
                asset: Hash256::hash(b"gold"),
                utxo_ids: vec![fee_input.utxo_id],
                op: Op::SecpMint(MintOperation {
                    mint_input: Input::new(vec![0]),
                    mint_output: MintOutput { owners: owners.clone() },
                    transfer_output: TransferOutput { amount: 5, owners },
                }),
            }],
        });

        assert!(matches!(validator().verify(signed(unsigned)?), Err(LedgerError::DoubleSpend(_))));
        Ok(())
    }

    #[test]
    fn test_operation_consumes_one_utxo() -> Result<()> {
        let owners = OutputOwners::single(crate::crypto::hash::Hash160::new([1u8; 20]));
        let mint = |utxo_ids: Vec<UtxoId>| {
            UnsignedTx::Operation(OperationTx {
                base: base(vec![input(b"a", 0, 10)], vec![]),
                ops: vec![Operation {
                    asset: Hash256::hash(b"gold"),
                    utxo_ids,
                    op: Op::SecpMint(MintOperation {
                        mint_input: Input::new(vec![0]),
                        mint_output: MintOutput { owners: owners.clone() },
                        transfer_output: TransferOutput { amount: 5, owners: owners.clone() },
                    }),
                }],
            })
        };
        let first = UtxoId::new(Hash256::hash(b"mint"), 0);
        let second = UtxoId::new(Hash256::hash(b"mint"), 1);

        validator().verify(signed(mint(vec![first]))?)?;

        // Two mint authorities would be consumed but only one renewed.
        let both = validator().verify(signed(mint(vec![first, second]))?);
        assert!(matches!(both, Err(LedgerError::InvalidOperation(_))));

        let none = validator().verify(signed(mint(vec![]))?);
        assert!(matches!(none, Err(LedgerError::InvalidOperation(_))));
        Ok(())
    }

    #[test]
    fn test_cross_chain_shape() -> Result<()> {
        let export = UnsignedTx::Export(ExportTx {
            base: base(vec![input(b"a", 0, 100)], vec![]),
            destination_chain: params().chain_id,
            exported_outs: vec![output(1, 50)],
        });
        assert!(matches!(validator().verify(signed(export)?), Err(LedgerError::InvalidTx(_))));

        let import = UnsignedTx::Import(ImportTx {
            base: base(vec![], vec![output(1, 98)]),
            source_chain: Hash256::hash(b"Y"),
            imported_ins: vec![],
        });
        assert!(matches!(
            validator().verify(signed(import)?),
            Err(LedgerError::InsufficientFunds { .. })
        ));

        let import = UnsignedTx::Import(ImportTx {
            base: base(vec![], vec![output(1, 98)]),
            source_chain: Hash256::hash(b"Y"),
            imported_ins: vec![input(b"exported", 0, 100)],
        });
        validator().verify(signed(import)?)?;
        Ok(())
    }
}
