use crate::codec::Codec;
use crate::config::{ChainParams, Config};
use crate::consensus::execution::{semantic_verify, MutationDescriptor, StateView};
use crate::consensus::validation::{TxValidator, Verified};
use crate::core::components::{Address, AssetId, ChainId, InputId, TxId, Utxo};
use crate::core::transaction::SignedTx;
use crate::core::utxo::{AssetDefinition, UtxoState, UtxoStore};
use crate::crypto::keys::encode_address;
use crate::fx::FxRegistry;
use crate::shared_memory::{SharedMemory, SledSharedMemory};
use crate::storage::Database;
use crate::{LedgerError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Source of the current time for time-locked outputs.
pub trait Clock: Send + Sync {
    /// Unix seconds.
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Total burned per asset over all accepted transactions.
    pub burned: BTreeMap<AssetId, u64>,
}

/// UTXO ledger of one chain: verifies transactions, tracks the ones waiting
/// for a block decision and commits accepted ones.
pub struct Ledger {
    params: ChainParams,
    codec: Codec,
    fxs: FxRegistry,
    validator: TxValidator,
    utxos: UtxoState,
    shared: Box<dyn SharedMemory>,
    clock: Box<dyn Clock>,
    pending: HashMap<TxId, MutationDescriptor>,
    pending_ids: HashSet<TxId>,
    stats: LedgerStats,
}

impl Ledger {
    /// Ledger whose shared memory lives in the same database as its UTXOs.
    pub fn new(params: ChainParams, db: Database, codec: Codec, fxs: FxRegistry) -> Self {
        let shared = SledSharedMemory::new(db.clone(), params.chain_id);
        Self::with_shared_memory(params, db, codec, fxs, Box::new(shared))
    }

    /// Ledger on the database under the configured data directory.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.storage)?;
        Ok(Self::new(config.chain.clone(), db, Codec::default(), FxRegistry::default()))
    }

    pub fn with_shared_memory(
        params: ChainParams,
        db: Database,
        codec: Codec,
        fxs: FxRegistry,
        shared: Box<dyn SharedMemory>,
    ) -> Self {
        log::info!("⛓️ Opening ledger for chain {} (codec v{})", params.chain_id, codec.version());

        Self {
            validator: TxValidator::new(params.clone(), codec, fxs.clone()),
            utxos: UtxoState::new(db, params.chain_id, codec),
            params,
            codec,
            fxs,
            shared,
            clock: Box::new(SystemClock),
            pending: HashMap::new(),
            pending_ids: HashSet::new(),
            stats: LedgerStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.params.chain_id
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn validator(&self) -> &TxValidator {
        &self.validator
    }

    pub fn verify(&self, tx: SignedTx) -> Result<Verified<SignedTx>> {
        self.validator.verify(tx)
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<Verified<SignedTx>> {
        self.verify(SignedTx::parse(&self.codec, bytes)?)
    }

    /// Executes `tx` against the current state without recording it.
    pub fn semantic_verify(&self, tx: &Verified<SignedTx>) -> Result<MutationDescriptor> {
        let view = StateView {
            params: &self.params,
            codec: &self.codec,
            fxs: &self.fxs,
            utxos: &self.utxos,
            shared: self.shared.as_ref(),
            pending: &self.pending_ids,
            now: self.clock.now(),
        };
        semantic_verify(tx, &view)
    }

    /// Executes `tx` and holds its descriptor until the block layer decides.
    pub fn submit(&mut self, tx: Verified<SignedTx>) -> Result<MutationDescriptor> {
        let tx_id = tx.id();
        if self.pending_ids.contains(&tx_id) {
            return Err(LedgerError::InvalidTx(format!("tx {} is already pending", tx_id)));
        }

        let descriptor = match self.semantic_verify(&tx) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                log::warn!("❌ Rejected tx {} ({:?}): {}", tx_id, e.class(), e);
                return Err(e);
            }
        };

        self.pending.insert(tx_id, descriptor.clone());
        self.pending_ids.insert(tx_id);
        log::debug!("📥 Tx {} pending on chain {}", tx_id, self.params.chain_id);
        Ok(descriptor)
    }

    /// Accepts a pending transaction.
    pub fn accept_pending(&mut self, tx_id: &TxId) -> Result<()> {
        let descriptor = self
            .pending
            .get(tx_id)
            .cloned()
            .ok_or_else(|| LedgerError::InvalidTx(format!("tx {} is not pending", tx_id)))?;
        self.accept(descriptor)
    }

    /// Commits `descriptor`: local UTXO changes, the new asset and the
    /// shared-memory requests, all in one atomic batch.
    pub fn accept(&mut self, descriptor: MutationDescriptor) -> Result<()> {
        let tx_id = descriptor.tx_id;
        self.pending.remove(&tx_id);
        self.pending_ids.remove(&tx_id);

        let mut batch = Vec::new();
        for utxo in &descriptor.consumed {
            batch.extend(self.utxos.consume_ops(utxo));
        }
        for utxo in &descriptor.produced {
            batch.extend(self.utxos.put_ops(utxo)?);
        }
        if let Some((asset_id, definition)) = &descriptor.new_asset {
            batch.extend(self.utxos.asset_ops(asset_id, definition)?);
        }

        if let Err(e) = self.shared.apply(&descriptor.shared, &batch) {
            if e.is_fatal() {
                log::error!("💥 Failed to commit tx {}: {}", tx_id, e);
            } else {
                // Lost a race for one of its inputs; nothing was written.
                self.stats.rejected += 1;
                log::warn!("🚫 Rejected tx {} at commit ({:?}): {}", tx_id, e.class(), e);
            }
            return Err(e);
        }

        for (asset, amount) in &descriptor.burned {
            let total = self.stats.burned.entry(*asset).or_insert(0);
            *total = total.saturating_add(*amount);
        }
        self.stats.accepted += 1;

        log::info!(
            "✅ Accepted tx {} on chain {}: {} consumed, {} produced, {} peer chain(s)",
            tx_id,
            self.params.chain_id,
            descriptor.consumed.len(),
            descriptor.produced.len(),
            descriptor.shared.len()
        );
        Ok(())
    }

    /// Drops a pending transaction. Nothing was written for it.
    pub fn reject(&mut self, tx_id: &TxId) -> bool {
        self.pending_ids.remove(tx_id);
        if self.pending.remove(tx_id).is_some() {
            self.stats.rejected += 1;
            log::warn!("🚫 Rejected pending tx {}", tx_id);
            true
        } else {
            false
        }
    }

    /// Verifies, submits and accepts in one step.
    pub fn process(&mut self, tx: SignedTx) -> Result<TxId> {
        let verified = self.verify(tx)?;
        let tx_id = verified.id();
        self.submit(verified)?;
        self.accept_pending(&tx_id)?;
        Ok(tx_id)
    }

    pub fn is_pending(&self, tx_id: &TxId) -> bool {
        self.pending_ids.contains(tx_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // Genesis hooks
    pub fn seed_asset(&self, id: AssetId, definition: AssetDefinition) -> Result<()> {
        self.utxos.apply_batch(&self.utxos.asset_ops(&id, &definition)?)?;
        log::info!("🌱 Seeded asset {} ({})", definition.symbol, id);
        Ok(())
    }

    pub fn seed_utxo(&self, utxo: Utxo) -> Result<()> {
        self.utxos.put_utxo(&utxo)?;

        let owners: Vec<String> = utxo.addresses().iter().map(encode_address).collect();
        log::info!("🌱 Seeded utxo {} for {}", utxo.utxo_id, owners.join(","));
        Ok(())
    }

    // Queries
    pub fn get_utxo(&self, id: &InputId) -> Result<Option<Utxo>> {
        self.utxos.get_utxo(id)
    }

    pub fn get_utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        self.utxos.get_utxos(address)
    }

    pub fn get_balance(&self, address: &Address, asset: &AssetId) -> Result<u64> {
        self.utxos.get_balance(address, asset)
    }

    pub fn get_asset(&self, id: &AssetId) -> Result<Option<AssetDefinition>> {
        self.utxos.get_asset(id)
    }

    pub fn utxo_count(&self) -> Result<usize> {
        self.utxos.utxo_count()
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }
}
