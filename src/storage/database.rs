use crate::config::StorageConfig;
use crate::core::components::ChainId;
use crate::crypto::hash::Hash256;
use crate::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use std::sync::Arc;

// Database tree names (equivalent to column families)
const TREE_UTXOS: &str = "utxos";
const TREE_UTXO_INDEX: &str = "utxo_index";
const TREE_ASSETS: &str = "assets";
const TREE_SHARED_ELEMENTS: &str = "shared_elements";
const TREE_SHARED_INDEX: &str = "shared_index";

/// Chain-local trees. Each chain gets its own copy, named after its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTree {
    Utxos,
    UtxoIndex,
    Assets,
}

impl LocalTree {
    fn position(&self) -> usize {
        match self {
            LocalTree::Utxos => 0,
            LocalTree::UtxoIndex => 1,
            LocalTree::Assets => 2,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LocalTree::Utxos => TREE_UTXOS,
            LocalTree::UtxoIndex => TREE_UTXO_INDEX,
            LocalTree::Assets => TREE_ASSETS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { tree: LocalTree, key: Vec<u8>, value: Vec<u8> },
    Delete { tree: LocalTree, key: Vec<u8> },
    /// Delete that aborts the whole batch when the key is absent.
    Consume { tree: LocalTree, key: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharedOp {
    Put { key: Vec<u8>, value: Vec<u8>, index_keys: Vec<Vec<u8>> },
    /// Aborts the whole batch when the element is absent.
    Remove { key: Vec<u8> },
}

/// Stored form of a shared element: its value plus the index entries that
/// must disappear with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SharedRecord {
    value: Vec<u8>,
    index_keys: Vec<Vec<u8>>,
}

pub type KvIter = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + Send>;

#[derive(Debug, Clone)]
pub struct Database {
    db: Arc<Db>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| LedgerError::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
        })
    }

    pub fn open(config: &StorageConfig) -> Result<Self> {
        Self::new(config.data_dir.join("ledger.db"))
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| LedgerError::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
        })
    }

    fn get_tree(&self, tree_name: &str) -> Result<Tree> {
        self.db.open_tree(tree_name)
            .map_err(|e| LedgerError::Storage(format!("Failed to open tree {}: {}", tree_name, e)))
    }

    fn chain_tree(&self, chain: &ChainId, tree: LocalTree) -> Result<Tree> {
        self.get_tree(&format!("{}/{}", tree.name(), chain.to_hex()))
    }

    // Chain-local reads
    pub fn get(&self, chain: &ChainId, tree: LocalTree, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tree = self.chain_tree(chain, tree)?;

        let value = tree.get(key)
            .map_err(|e| LedgerError::Storage(format!("Failed to read key: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    /// Entries under `prefix` in key order, starting strictly after `after`
    /// when given.
    pub fn scan_prefix(
        &self,
        chain: &ChainId,
        tree: LocalTree,
        prefix: &[u8],
        after: Option<&[u8]>,
    ) -> Result<KvIter> {
        let tree = self.chain_tree(chain, tree)?;
        Ok(Self::prefix_iter(&tree, prefix, after))
    }

    pub fn count(&self, chain: &ChainId, tree: LocalTree) -> Result<usize> {
        Ok(self.chain_tree(chain, tree)?.len())
    }

    // Shared-memory reads
    pub fn get_shared(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let elements = self.get_tree(TREE_SHARED_ELEMENTS)?;

        match elements.get(key)
            .map_err(|e| LedgerError::Storage(format!("Failed to read shared element: {}", e)))? {
            Some(data) => {
                let record: SharedRecord = bincode::deserialize(&data)?;
                Ok(Some(record.value))
            }
            None => Ok(None),
        }
    }

    pub fn scan_shared_index(&self, prefix: &[u8], after: Option<&[u8]>) -> Result<KvIter> {
        let index = self.get_tree(TREE_SHARED_INDEX)?;
        Ok(Self::prefix_iter(&index, prefix, after))
    }

    fn prefix_iter(tree: &Tree, prefix: &[u8], after: Option<&[u8]>) -> KvIter {
        let prefix = prefix.to_vec();
        let iter = match after {
            Some(cursor) => tree.range(cursor.to_vec()..),
            None => tree.range(prefix.clone()..),
        };
        let cursor = after.map(|c| c.to_vec());

        Box::new(
            iter.map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|e| LedgerError::Storage(format!("Failed to iterate: {}", e)))
            })
            .skip_while(move |item| match (item, &cursor) {
                (Ok((key, _)), Some(cursor)) => key == cursor,
                _ => false,
            })
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            }),
        )
    }

    /// Applies chain-local and shared-memory operations as one atomic unit.
    pub fn commit(&self, chain: &ChainId, ops: &[BatchOp], shared: &[SharedOp]) -> Result<()> {
        let utxos = self.chain_tree(chain, LocalTree::Utxos)?;
        let utxo_index = self.chain_tree(chain, LocalTree::UtxoIndex)?;
        let assets = self.chain_tree(chain, LocalTree::Assets)?;
        let elements = self.get_tree(TREE_SHARED_ELEMENTS)?;
        let shared_index = self.get_tree(TREE_SHARED_INDEX)?;

        let result = (&utxos, &utxo_index, &assets, &elements, &shared_index).transaction(
            |(utxos, utxo_index, assets, elements, shared_index)| {
                let local: [&TransactionalTree; 3] = [utxos, utxo_index, assets];

                for op in ops {
                    match op {
                        BatchOp::Put { tree, key, value } => {
                            local[tree.position()].insert(key.as_slice(), value.as_slice())?;
                        }
                        BatchOp::Delete { tree, key } => {
                            local[tree.position()].remove(key.as_slice())?;
                        }
                        BatchOp::Consume { tree, key } => {
                            if local[tree.position()].remove(key.as_slice())?.is_none() {
                                return Err(ConflictableTransactionError::Abort(missing(key)));
                            }
                        }
                    }
                }

                for op in shared {
                    match op {
                        SharedOp::Put { key, value, index_keys } => {
                            let record = SharedRecord {
                                value: value.clone(),
                                index_keys: index_keys.clone(),
                            };
                            let data = bincode::serialize(&record).map_err(|e| {
                                ConflictableTransactionError::Abort(LedgerError::Encoding(e))
                            })?;

                            elements.insert(key.as_slice(), data)?;
                            for index_key in index_keys {
                                shared_index.insert(index_key.as_slice(), key.as_slice())?;
                            }
                        }
                        SharedOp::Remove { key } => {
                            let data = match elements.remove(key.as_slice())? {
                                Some(data) => data,
                                None => {
                                    return Err(ConflictableTransactionError::Abort(missing(key)))
                                }
                            };
                            let record: SharedRecord = bincode::deserialize(&data).map_err(|e| {
                                ConflictableTransactionError::Abort(LedgerError::Encoding(e))
                            })?;

                            for index_key in &record.index_keys {
                                shared_index.remove(index_key.as_slice())?;
                            }
                        }
                    }
                }

                Ok(())
            },
        );

        match result {
            Ok(()) => {
                log::debug!("💾 Committed {} local and {} shared operations", ops.len(), shared.len());
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => {
                Err(LedgerError::Storage(format!("Failed to commit batch: {}", e)))
            }
        }
    }
}

/// Utxo and shared element keys both end with the utxo's input id.
fn missing(key: &[u8]) -> LedgerError {
    let id = key
        .len()
        .checked_sub(Hash256::LEN)
        .and_then(|start| Hash256::from_slice(&key[start..]))
        .unwrap_or_default();
    LedgerError::MissingUtxo { id, temporary: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chain() -> ChainId {
        Hash256::hash(b"chain")
    }

    #[test]
    fn test_commit_and_read() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"))?;

        db.commit(
            &chain(),
            &[BatchOp::Put { tree: LocalTree::Utxos, key: vec![1], value: vec![9] }],
            &[],
        )?;

        assert_eq!(db.get(&chain(), LocalTree::Utxos, &[1])?, Some(vec![9]));
        assert_eq!(db.get(&Hash256::zero(), LocalTree::Utxos, &[1])?, None);
        Ok(())
    }

    #[test]
    fn test_failed_consume_rolls_back_batch() -> Result<()> {
        let db = Database::temporary()?;

        let result = db.commit(
            &chain(),
            &[
                BatchOp::Put { tree: LocalTree::Utxos, key: vec![1], value: vec![9] },
                BatchOp::Consume { tree: LocalTree::Utxos, key: vec![2] },
            ],
            &[SharedOp::Put { key: vec![3], value: vec![4], index_keys: vec![] }],
        );

        assert!(matches!(result, Err(LedgerError::MissingUtxo { .. })));
        assert_eq!(db.get(&chain(), LocalTree::Utxos, &[1])?, None);
        assert_eq!(db.get_shared(&[3])?, None);
        Ok(())
    }

    #[test]
    fn test_shared_remove_clears_index() -> Result<()> {
        let db = Database::temporary()?;
        let index_key = b"idx/a/key".to_vec();

        db.commit(
            &chain(),
            &[],
            &[SharedOp::Put { key: b"key".to_vec(), value: vec![7], index_keys: vec![index_key.clone()] }],
        )?;
        assert_eq!(db.get_shared(b"key")?, Some(vec![7]));
        assert_eq!(db.scan_shared_index(b"idx/a/", None)?.count(), 1);

        db.commit(&chain(), &[], &[SharedOp::Remove { key: b"key".to_vec() }])?;
        assert_eq!(db.get_shared(b"key")?, None);
        assert_eq!(db.scan_shared_index(b"idx/a/", None)?.count(), 0);

        let again = db.commit(&chain(), &[], &[SharedOp::Remove { key: b"key".to_vec() }]);
        assert!(matches!(again, Err(LedgerError::MissingUtxo { .. })));
        Ok(())
    }

    #[test]
    fn test_missing_shared_element_reports_its_id() -> Result<()> {
        let db = Database::temporary()?;
        let id = Hash256::hash(b"exported utxo");
        let mut key = Hash256::hash(b"owner").as_bytes().to_vec();
        key.extend_from_slice(Hash256::hash(b"peer").as_bytes());
        key.extend_from_slice(id.as_bytes());

        let result = db.commit(&chain(), &[], &[SharedOp::Remove { key }]);
        assert!(matches!(result, Err(LedgerError::MissingUtxo { id: missing, .. }) if missing == id));

        let local = db.commit(
            &chain(),
            &[BatchOp::Consume { tree: LocalTree::Utxos, key: id.as_bytes().to_vec() }],
            &[],
        );
        assert!(matches!(local, Err(LedgerError::MissingUtxo { id: missing, .. }) if missing == id));
        Ok(())
    }

    #[test]
    fn test_scan_prefix_with_cursor() -> Result<()> {
        let db = Database::temporary()?;
        let ops: Vec<BatchOp> = [b"a1", b"a2", b"a3", b"b1"]
            .iter()
            .map(|k| BatchOp::Put { tree: LocalTree::UtxoIndex, key: k.to_vec(), value: vec![] })
            .collect();
        db.commit(&chain(), &ops, &[])?;

        let keys: Vec<Vec<u8>> = db
            .scan_prefix(&chain(), LocalTree::UtxoIndex, b"a", None)?
            .map(|item| item.map(|(k, _)| k))
            .collect::<Result<_>>()?;
        assert_eq!(keys, vec![b"a1".to_vec(), b"a2".to_vec(), b"a3".to_vec()]);

        let resumed: Vec<Vec<u8>> = db
            .scan_prefix(&chain(), LocalTree::UtxoIndex, b"a", Some(&b"a1"[..]))?
            .map(|item| item.map(|(k, _)| k))
            .collect::<Result<_>>()?;
        assert_eq!(resumed, vec![b"a2".to_vec(), b"a3".to_vec()]);
        Ok(())
    }
}
