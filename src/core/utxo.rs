use crate::codec::Codec;
use crate::core::components::{Address, AssetId, ChainId, InputId, Utxo};
use crate::crypto::hash::Hash256;
use crate::fx::FxId;
use crate::storage::{BatchOp, Database, LocalTree};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Immutable definition of an asset, stored when its creating transaction
/// is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDefinition {
    pub name: String,
    pub symbol: String,
    pub denomination: u8,
    /// Extensions the asset's UTXOs may use.
    pub fxs: Vec<FxId>,
}

impl AssetDefinition {
    pub fn supports(&self, fx: FxId) -> bool {
        self.fxs.contains(&fx)
    }
}

pub type InputIdIter = Box<dyn Iterator<Item = Result<InputId>> + Send>;

/// Chain-local UTXO and asset state.
pub trait UtxoStore: Send + Sync {
    fn get_utxo(&self, id: &InputId) -> Result<Option<Utxo>>;

    fn put_utxo(&self, utxo: &Utxo) -> Result<()>;

    fn delete_utxo(&self, id: &InputId) -> Result<()>;

    /// Ids of the UTXOs owned by `address` in key order, resuming strictly
    /// after `cursor` when given. Lazy: nothing is read until iterated.
    fn utxo_ids_by_address(&self, address: &Address, cursor: Option<InputId>) -> Result<InputIdIter>;

    fn get_asset(&self, id: &AssetId) -> Result<Option<AssetDefinition>>;

    /// Applies all operations or none.
    fn apply_batch(&self, ops: &[BatchOp]) -> Result<()>;
}

/// sled-backed UTXO set of one chain.
#[derive(Debug, Clone)]
pub struct UtxoState {
    db: Database,
    chain_id: ChainId,
    codec: Codec,
}

impl UtxoState {
    pub fn new(db: Database, chain_id: ChainId, codec: Codec) -> Self {
        Self { db, chain_id, codec }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn index_key(address: &Address, id: &InputId) -> Vec<u8> {
        let mut key = Vec::with_capacity(20 + 32);
        key.extend_from_slice(address.as_bytes());
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Operations inserting `utxo` and its address index entries.
    pub fn put_ops(&self, utxo: &Utxo) -> Result<Vec<BatchOp>> {
        let id = utxo.input_id();
        let mut ops = vec![BatchOp::Put {
            tree: LocalTree::Utxos,
            key: id.as_bytes().to_vec(),
            value: self.codec.encode(utxo)?,
        }];

        for address in utxo.addresses() {
            ops.push(BatchOp::Put {
                tree: LocalTree::UtxoIndex,
                key: Self::index_key(address, &id),
                value: Vec::new(),
            });
        }
        Ok(ops)
    }

    /// Operations removing `utxo`. The batch aborts if it is already gone.
    pub fn consume_ops(&self, utxo: &Utxo) -> Vec<BatchOp> {
        let id = utxo.input_id();
        let mut ops = vec![BatchOp::Consume {
            tree: LocalTree::Utxos,
            key: id.as_bytes().to_vec(),
        }];

        for address in utxo.addresses() {
            ops.push(BatchOp::Delete {
                tree: LocalTree::UtxoIndex,
                key: Self::index_key(address, &id),
            });
        }
        ops
    }

    pub fn asset_ops(&self, id: &AssetId, definition: &AssetDefinition) -> Result<Vec<BatchOp>> {
        Ok(vec![BatchOp::Put {
            tree: LocalTree::Assets,
            key: id.as_bytes().to_vec(),
            value: self.codec.encode(definition)?,
        }])
    }

    pub fn get_utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        let mut utxos = Vec::new();
        for id in self.utxo_ids_by_address(address, None)? {
            if let Some(utxo) = self.get_utxo(&id?)? {
                utxos.push(utxo);
            }
        }
        Ok(utxos)
    }

    /// Spendable amount of `asset` held by `address`. Multi-owner outputs
    /// count for every owner.
    pub fn get_balance(&self, address: &Address, asset: &AssetId) -> Result<u64> {
        let mut balance = 0u64;
        for utxo in self.get_utxos(address)? {
            if utxo.asset == *asset {
                balance = balance.saturating_add(utxo.out.amount().unwrap_or(0));
            }
        }
        Ok(balance)
    }

    pub fn utxo_count(&self) -> Result<usize> {
        self.db.count(&self.chain_id, LocalTree::Utxos)
    }
}

impl UtxoStore for UtxoState {
    fn get_utxo(&self, id: &InputId) -> Result<Option<Utxo>> {
        match self.db.get(&self.chain_id, LocalTree::Utxos, id.as_bytes())? {
            Some(data) => Ok(Some(self.codec.decode(&data)?)),
            None => Ok(None),
        }
    }

    fn put_utxo(&self, utxo: &Utxo) -> Result<()> {
        let ops = self.put_ops(utxo)?;
        self.apply_batch(&ops)?;

        log::debug!("💾 Saved UTXO {}", utxo.utxo_id);
        Ok(())
    }

    fn delete_utxo(&self, id: &InputId) -> Result<()> {
        if let Some(utxo) = self.get_utxo(id)? {
            let ops = self.consume_ops(&utxo);
            self.apply_batch(&ops)?;
            log::debug!("🗑️ Deleted UTXO {}", utxo.utxo_id);
        }
        Ok(())
    }

    fn utxo_ids_by_address(&self, address: &Address, cursor: Option<InputId>) -> Result<InputIdIter> {
        let after = cursor.map(|id| Self::index_key(address, &id));
        let entries = self.db.scan_prefix(
            &self.chain_id,
            LocalTree::UtxoIndex,
            address.as_bytes(),
            after.as_deref(),
        )?;

        Ok(Box::new(entries.map(|entry| {
            let (key, _) = entry?;
            Ok(Hash256::from_slice(&key[20..]).unwrap_or_default())
        })))
    }

    fn get_asset(&self, id: &AssetId) -> Result<Option<AssetDefinition>> {
        match self.db.get(&self.chain_id, LocalTree::Assets, id.as_bytes())? {
            Some(data) => Ok(Some(self.codec.decode(&data)?)),
            None => Ok(None),
        }
    }

    fn apply_batch(&self, ops: &[BatchOp]) -> Result<()> {
        self.db.commit(&self.chain_id, ops, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::components::UtxoId;
    use crate::crypto::hash::Hash160;
    use crate::fx::secp256k1::{OutputOwners, TransferOutput};
    use crate::fx::Output;
    use tempfile::TempDir;

    fn utxo(tx: &[u8], index: u32, owner: Address, amount: u64) -> Utxo {
        Utxo {
            utxo_id: UtxoId::new(Hash256::hash(tx), index),
            asset: Hash256::hash(b"asset"),
            out: Output::Transfer(TransferOutput { amount, owners: OutputOwners::single(owner) }),
        }
    }

    #[test]
    fn test_put_get_delete() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("utxo.db"))?;
        let state = UtxoState::new(db, Hash256::hash(b"chain"), Codec::default());
        let alice = Hash160::new([1u8; 20]);

        let entry = utxo(b"tx", 0, alice, 500);
        state.put_utxo(&entry)?;
        assert_eq!(state.get_utxo(&entry.input_id())?, Some(entry.clone()));
        assert_eq!(state.get_balance(&alice, &entry.asset)?, 500);

        state.delete_utxo(&entry.input_id())?;
        assert_eq!(state.get_utxo(&entry.input_id())?, None);
        assert_eq!(state.get_balance(&alice, &entry.asset)?, 0);
        Ok(())
    }

    #[test]
    fn test_address_index_is_restartable() -> Result<()> {
        let state = UtxoState::new(Database::temporary()?, Hash256::hash(b"chain"), Codec::default());
        let alice = Hash160::new([1u8; 20]);
        let bob = Hash160::new([2u8; 20]);

        for i in 0..5 {
            state.put_utxo(&utxo(b"tx", i, alice, 10))?;
        }
        state.put_utxo(&utxo(b"other", 0, bob, 10))?;

        let all: Vec<InputId> = state.utxo_ids_by_address(&alice, None)?.collect::<Result<_>>()?;
        assert_eq!(all.len(), 5);

        let mut first_page = state.utxo_ids_by_address(&alice, None)?;
        let cursor = first_page.next().unwrap()?;
        drop(first_page);

        let rest: Vec<InputId> = state.utxo_ids_by_address(&alice, Some(cursor))?.collect::<Result<_>>()?;
        assert_eq!(rest, all[1..].to_vec());
        Ok(())
    }

    #[test]
    fn test_chains_are_isolated() -> Result<()> {
        let db = Database::temporary()?;
        let chain_a = UtxoState::new(db.clone(), Hash256::hash(b"a"), Codec::default());
        let chain_b = UtxoState::new(db, Hash256::hash(b"b"), Codec::default());

        let entry = utxo(b"tx", 0, Hash160::new([1u8; 20]), 5);
        chain_a.put_utxo(&entry)?;

        assert!(chain_b.get_utxo(&entry.input_id())?.is_none());
        assert_eq!(chain_a.utxo_count()?, 1);
        Ok(())
    }

    #[test]
    fn test_consuming_twice_aborts() -> Result<()> {
        let state = UtxoState::new(Database::temporary()?, Hash256::hash(b"chain"), Codec::default());
        let entry = utxo(b"tx", 0, Hash160::new([1u8; 20]), 5);
        state.put_utxo(&entry)?;

        state.apply_batch(&state.consume_ops(&entry))?;
        assert!(state.apply_batch(&state.consume_ops(&entry)).is_err());
        Ok(())
    }
}
