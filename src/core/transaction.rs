use crate::codec::Codec;
use crate::core::components::{AssetId, ChainId, TransferableInput, TransferableOutput, TxId, UtxoId};
use crate::crypto::hash::Hash256;
use crate::crypto::keys::PrivateKey;
use crate::fx::{secp256k1, Credential, FxId, Op, Output};
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Fields every transaction carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseTx {
    pub network_id: u32,
    pub chain_id: ChainId,
    pub outs: Vec<TransferableOutput>,
    pub ins: Vec<TransferableInput>,
    pub memo: Vec<u8>,
}

impl BaseTx {
    pub fn new(network_id: u32, chain_id: ChainId) -> Self {
        Self {
            network_id,
            chain_id,
            outs: Vec::new(),
            ins: Vec::new(),
            memo: Vec::new(),
        }
    }
}

/// Outputs created with a new asset, grouped by the fx that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InitialState {
    pub fx_index: u32,
    pub outs: Vec<Output>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAssetTx {
    pub base: BaseTx,
    pub name: String,
    pub symbol: String,
    pub denomination: u8,
    pub states: Vec<InitialState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub asset: AssetId,
    pub utxo_ids: Vec<UtxoId>,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTx {
    pub base: BaseTx,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTx {
    pub base: BaseTx,
    pub destination_chain: ChainId,
    pub exported_outs: Vec<TransferableOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTx {
    pub base: BaseTx,
    pub source_chain: ChainId,
    pub imported_ins: Vec<TransferableInput>,
}

/// The variant order is the wire tag and must never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnsignedTx {
    Base(BaseTx),
    CreateAsset(CreateAssetTx),
    Operation(OperationTx),
    Export(ExportTx),
    Import(ImportTx),
}

impl UnsignedTx {
    pub fn base(&self) -> &BaseTx {
        match self {
            UnsignedTx::Base(tx) => tx,
            UnsignedTx::CreateAsset(tx) => &tx.base,
            UnsignedTx::Operation(tx) => &tx.base,
            UnsignedTx::Export(tx) => &tx.base,
            UnsignedTx::Import(tx) => &tx.base,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnsignedTx::Base(_) => "base",
            UnsignedTx::CreateAsset(_) => "create_asset",
            UnsignedTx::Operation(_) => "operation",
            UnsignedTx::Export(_) => "export",
            UnsignedTx::Import(_) => "import",
        }
    }

    /// Inputs whose value flows into this transaction: base inputs plus,
    /// for imports, the imported inputs.
    pub fn consumed_inputs(&self) -> impl Iterator<Item = &TransferableInput> {
        let imported: &[TransferableInput] = match self {
            UnsignedTx::Import(tx) => &tx.imported_ins,
            _ => &[],
        };
        self.base().ins.iter().chain(imported.iter())
    }

    /// Outputs whose value leaves through this transaction: base outputs
    /// plus, for exports, the exported outputs.
    pub fn produced_outputs(&self) -> impl Iterator<Item = &TransferableOutput> {
        let exported: &[TransferableOutput] = match self {
            UnsignedTx::Export(tx) => &tx.exported_outs,
            _ => &[],
        };
        self.base().outs.iter().chain(exported.iter())
    }

    /// The fx of each credential slot, in the fixed order base inputs,
    /// operations, imported inputs.
    pub fn credential_fxs(&self) -> Vec<FxId> {
        let mut fxs = vec![FxId::Secp256k1; self.base().ins.len()];
        match self {
            UnsignedTx::Operation(tx) => fxs.extend(tx.ops.iter().map(|op| op.op.fx())),
            UnsignedTx::Import(tx) => {
                fxs.extend(std::iter::repeat(FxId::Secp256k1).take(tx.imported_ins.len()))
            }
            _ => {}
        }
        fxs
    }

    pub fn credential_count(&self) -> usize {
        self.credential_fxs().len()
    }
}

/// A transaction with its credentials, plus the cached encoding and id.
///
/// The signed encoding is `version || unsigned || credentials`, so the
/// unsigned bytes are a prefix of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    unsigned: UnsignedTx,
    credentials: Vec<Credential>,
    id: TxId,
    bytes: Vec<u8>,
    unsigned_len: usize,
}

impl SignedTx {
    pub fn new(codec: &Codec, unsigned: UnsignedTx, credentials: Vec<Credential>) -> Result<Self> {
        let unsigned_len = codec.size(&unsigned)? as usize;
        let bytes = codec.encode(&(&unsigned, &credentials))?;
        let id = Hash256::hash(&bytes);

        Ok(Self {
            unsigned,
            credentials,
            id,
            bytes,
            unsigned_len,
        })
    }

    pub fn parse(codec: &Codec, bytes: &[u8]) -> Result<Self> {
        let (unsigned, credentials): (UnsignedTx, Vec<Credential>) = codec.decode(bytes)?;
        let unsigned_len = codec.size(&unsigned)? as usize;

        Ok(Self {
            unsigned,
            credentials,
            id: Hash256::hash(bytes),
            bytes: bytes.to_vec(),
            unsigned_len,
        })
    }

    /// Signs every credential slot with the given keys. `signers[i]` must
    /// list the keys of slot `i` in signature-index order.
    pub fn sign(codec: &Codec, unsigned: UnsignedTx, signers: &[Vec<PrivateKey>]) -> Result<Self> {
        let fxs = unsigned.credential_fxs();
        if signers.len() != fxs.len() {
            return Err(LedgerError::WrongNumberOfCredentials {
                expected: fxs.len(),
                actual: signers.len(),
            });
        }

        let message = Hash256::hash(&codec.encode(&unsigned)?);
        let credentials = fxs
            .into_iter()
            .zip(signers)
            .map(|(fx, keys)| {
                let sigs = secp256k1::Credential {
                    sigs: keys.iter().map(|key| key.sign(&message)).collect(),
                };
                match fx {
                    FxId::Secp256k1 => Credential::Secp256k1(sigs),
                    FxId::Nft => Credential::Nft(sigs),
                }
            })
            .collect();

        Self::new(codec, unsigned, credentials)
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn unsigned(&self) -> &UnsignedTx {
        &self.unsigned
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn unsigned_bytes(&self) -> &[u8] {
        &self.bytes[..self.unsigned_len]
    }

    /// Signature challenge: hash of the unsigned bytes.
    pub fn message(&self) -> Hash256 {
        Hash256::hash(self.unsigned_bytes())
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::Hash160;
    use crate::fx::secp256k1::{Input, MintOperation, MintOutput, OutputOwners, TransferInput, TransferOutput};

    fn sample_base() -> BaseTx {
        let owners = OutputOwners::single(Hash160::new([3u8; 20]));
        let mut base = BaseTx::new(5, Hash256::hash(b"chain"));
        base.ins.push(TransferableInput {
            utxo_id: UtxoId::new(Hash256::hash(b"prev"), 0),
            asset: Hash256::hash(b"asset"),
            input: TransferInput { amount: 20_000, input: Input::new(vec![0]) },
        });
        base.outs.push(TransferableOutput {
            asset: Hash256::hash(b"asset"),
            out: TransferOutput { amount: 10_000, owners },
        });
        base.memo = b"hello".to_vec();
        base
    }

    #[test]
    fn test_unsigned_bytes_prefix_signed_bytes() -> Result<()> {
        let codec = Codec::default();
        let key = PrivateKey::new()?;
        let unsigned = UnsignedTx::Base(sample_base());

        let tx = SignedTx::sign(&codec, unsigned.clone(), &[vec![key]])?;

        assert_eq!(tx.unsigned_bytes(), codec.encode(&unsigned)?.as_slice());
        assert!(tx.bytes().starts_with(tx.unsigned_bytes()));
        assert_eq!(tx.id(), Hash256::hash(tx.bytes()));
        Ok(())
    }

    #[test]
    fn test_parse_roundtrip_every_variant() -> Result<()> {
        let codec = Codec::default();
        let base = sample_base();
        let owners = OutputOwners::single(Hash160::new([4u8; 20]));

        let variants = vec![
            UnsignedTx::Base(BaseTx { outs: vec![], memo: vec![0xAB; 256], ..base.clone() }),
            UnsignedTx::CreateAsset(CreateAssetTx {
                base: base.clone(),
                name: "Gold".to_string(),
                symbol: "GLD".to_string(),
                denomination: 9,
                states: vec![InitialState {
                    fx_index: 0,
                    outs: vec![Output::Mint(MintOutput { owners: owners.clone() })],
                }],
            }),
            UnsignedTx::Operation(OperationTx {
                base: base.clone(),
                ops: vec![Operation {
                    asset: Hash256::hash(b"asset"),
                    utxo_ids: vec![UtxoId::new(Hash256::hash(b"mint"), 1)],
                    op: Op::SecpMint(MintOperation {
                        mint_input: Input::new(vec![0]),
                        mint_output: MintOutput { owners: owners.clone() },
                        transfer_output: TransferOutput { amount: 1, owners: owners.clone() },
                    }),
                }],
            }),
            UnsignedTx::Export(ExportTx {
                base: base.clone(),
                destination_chain: Hash256::hash(b"other"),
                exported_outs: base.outs.clone(),
            }),
            UnsignedTx::Import(ImportTx {
                base: base.clone(),
                source_chain: Hash256::hash(b"other"),
                imported_ins: base.ins.clone(),
            }),
        ];

        for unsigned in variants {
            let groups = unsigned.credential_count();
            let credentials = vec![Credential::Secp256k1(Default::default()); groups];
            let tx = SignedTx::new(&codec, unsigned, credentials)?;

            let parsed = SignedTx::parse(&codec, tx.bytes())?;
            assert_eq!(parsed, tx);
        }
        Ok(())
    }

    #[test]
    fn test_credential_slots() {
        let base = sample_base();
        let import = UnsignedTx::Import(ImportTx {
            base: base.clone(),
            source_chain: Hash256::zero(),
            imported_ins: vec![base.ins[0].clone(), base.ins[0].clone()],
        });

        assert_eq!(import.credential_count(), 3);
        assert_eq!(import.consumed_inputs().count(), 3);
        assert_eq!(import.produced_outputs().count(), 1);
    }
}
