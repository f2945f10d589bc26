//! Cross-chain shared memory.
//!
//! Storage is partitioned into regions keyed by `(owner chain, peer chain)`.
//! A chain writes into the region its peer owns and reads or removes only in
//! regions it owns itself, so an element exported from A to B is visible to B
//! alone and can be consumed exactly once.

use crate::core::components::ChainId;
use crate::crypto::hash::Hash256;
use crate::storage::{BatchOp, Database, SharedOp};
use crate::{LedgerError, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Index terms the receiving chain can list the element by.
    pub traits: Vec<Vec<u8>>,
}

/// Changes addressed to one peer chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requests {
    pub put_requests: Vec<Element>,
    pub remove_requests: Vec<Vec<u8>>,
}

impl Requests {
    pub fn is_empty(&self) -> bool {
        self.put_requests.is_empty() && self.remove_requests.is_empty()
    }
}

/// Queues `element` to be written for `peer`.
pub fn stage(requests: &mut BTreeMap<ChainId, Requests>, peer: ChainId, element: Element) {
    requests.entry(peer).or_default().put_requests.push(element);
}

/// Queues removal of the element `peer` wrote for this chain under `key`.
pub fn consume(requests: &mut BTreeMap<ChainId, Requests>, peer: ChainId, key: Vec<u8>) {
    requests.entry(peer).or_default().remove_requests.push(key);
}

pub type ElementIter = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + Send>;

/// One chain's view of shared memory.
pub trait SharedMemory: Send + Sync {
    /// Values `peer` wrote for this chain, in `keys` order. A missing key is
    /// a temporary error: the exporting transaction may not be accepted yet.
    fn get(&self, peer: &ChainId, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>>;

    /// `(key, value)` of elements from `peer` carrying `trait_`, in key
    /// order, resuming strictly after `start_after`.
    fn list_by_trait(
        &self,
        peer: &ChainId,
        trait_: &[u8],
        start_after: Option<Vec<u8>>,
    ) -> Result<ElementIter>;

    /// Applies `requests` and the chain-local `batch` as one atomic unit.
    fn apply(&self, requests: &BTreeMap<ChainId, Requests>, batch: &[BatchOp]) -> Result<()>;
}

/// In-process shared memory over the node's sled database.
#[derive(Debug, Clone)]
pub struct SledSharedMemory {
    db: Database,
    chain_id: ChainId,
}

impl SledSharedMemory {
    pub fn new(db: Database, chain_id: ChainId) -> Self {
        Self { db, chain_id }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn region(owner: &ChainId, peer: &ChainId) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(64);
        prefix.extend_from_slice(owner.as_bytes());
        prefix.extend_from_slice(peer.as_bytes());
        prefix
    }

    fn element_key(owner: &ChainId, peer: &ChainId, key: &[u8]) -> Vec<u8> {
        let mut full = Self::region(owner, peer);
        full.extend_from_slice(key);
        full
    }

    fn trait_prefix(owner: &ChainId, peer: &ChainId, trait_: &[u8]) -> Vec<u8> {
        let mut prefix = Self::region(owner, peer);
        prefix.extend_from_slice(&(trait_.len() as u16).to_be_bytes());
        prefix.extend_from_slice(trait_);
        prefix
    }

    fn index_key(owner: &ChainId, peer: &ChainId, trait_: &[u8], key: &[u8]) -> Vec<u8> {
        let mut full = Self::trait_prefix(owner, peer, trait_);
        full.extend_from_slice(key);
        full
    }
}

impl SharedMemory for SledSharedMemory {
    fn get(&self, peer: &ChainId, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        keys.iter()
            .map(|key| {
                self.db
                    .get_shared(&Self::element_key(&self.chain_id, peer, key))?
                    .ok_or_else(|| LedgerError::MissingUtxo {
                        id: Hash256::from_slice(key).unwrap_or_default(),
                        temporary: true,
                    })
            })
            .collect()
    }

    fn list_by_trait(
        &self,
        peer: &ChainId,
        trait_: &[u8],
        start_after: Option<Vec<u8>>,
    ) -> Result<ElementIter> {
        let prefix = Self::trait_prefix(&self.chain_id, peer, trait_);
        let after = start_after.map(|key| Self::index_key(&self.chain_id, peer, trait_, &key));
        let entries = self.db.scan_shared_index(&prefix, after.as_deref())?;

        let db = self.db.clone();
        let region_len = Self::region(&self.chain_id, peer).len();

        Ok(Box::new(entries.filter_map(move |entry| {
            let (_, element_key) = match entry {
                Ok(kv) => kv,
                Err(e) => return Some(Err(e)),
            };
            match db.get_shared(&element_key) {
                Ok(Some(value)) => Some(Ok((element_key[region_len..].to_vec(), value))),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        })))
    }

    fn apply(&self, requests: &BTreeMap<ChainId, Requests>, batch: &[BatchOp]) -> Result<()> {
        let mut ops = Vec::new();

        for (peer, reqs) in requests {
            for element in &reqs.put_requests {
                ops.push(SharedOp::Put {
                    key: Self::element_key(peer, &self.chain_id, &element.key),
                    value: element.value.clone(),
                    index_keys: element
                        .traits
                        .iter()
                        .map(|t| Self::index_key(peer, &self.chain_id, t, &element.key))
                        .collect(),
                });
            }
            for key in &reqs.remove_requests {
                ops.push(SharedOp::Remove {
                    key: Self::element_key(&self.chain_id, peer, key),
                });
            }
        }

        self.db.commit(&self.chain_id, batch, &ops)?;

        log::debug!(
            "🔗 Applied shared memory requests for {} peer chain(s) on {}",
            requests.len(),
            self.chain_id
        );
        Ok(())
    }
}
