//! Per-asset value flow of a transaction and the fee/burn accounting built
//! on it.

use crate::config::ChainParams;
use crate::core::components::AssetId;
use crate::core::transaction::UnsignedTx;
use crate::{LedgerError, Result};
use std::collections::BTreeMap;

/// Fee charged in the fee asset for this kind of transaction.
pub fn required_fee(tx: &UnsignedTx, params: &ChainParams) -> u64 {
    match tx {
        UnsignedTx::CreateAsset(_) => params.create_asset_fee,
        UnsignedTx::Base(_)
        | UnsignedTx::Operation(_)
        | UnsignedTx::Export(_)
        | UnsignedTx::Import(_) => params.tx_fee,
    }
}

/// Consumed and produced amounts per asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flow {
    consumed: BTreeMap<AssetId, u64>,
    produced: BTreeMap<AssetId, u64>,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flow computed from the amounts the transaction claims.
    pub fn of(tx: &UnsignedTx) -> Result<Self> {
        let mut flow = Self::new();
        let base = tx.base();

        for input in &base.ins {
            flow.consume(input.asset, input.amount())?;
        }
        for output in &base.outs {
            flow.produce(output.asset, output.amount())?;
        }

        match tx {
            UnsignedTx::Base(_) | UnsignedTx::CreateAsset(_) | UnsignedTx::Operation(_) => {}
            UnsignedTx::Export(export) => {
                for output in &export.exported_outs {
                    flow.produce(output.asset, output.amount())?;
                }
            }
            UnsignedTx::Import(import) => {
                for input in &import.imported_ins {
                    flow.consume(input.asset, input.amount())?;
                }
            }
        }

        Ok(flow)
    }

    pub fn consume(&mut self, asset: AssetId, amount: u64) -> Result<()> {
        add(&mut self.consumed, asset, amount)
    }

    pub fn produce(&mut self, asset: AssetId, amount: u64) -> Result<()> {
        add(&mut self.produced, asset, amount)
    }

    pub fn consumed(&self, asset: &AssetId) -> u64 {
        self.consumed.get(asset).copied().unwrap_or(0)
    }

    pub fn produced(&self, asset: &AssetId) -> u64 {
        self.produced.get(asset).copied().unwrap_or(0)
    }

    /// Every asset the flow touches, in id order.
    pub fn assets(&self) -> Vec<AssetId> {
        let mut assets: Vec<AssetId> = self.consumed.keys().chain(self.produced.keys()).copied().collect();
        assets.sort();
        assets.dedup();
        assets
    }

    /// Consumed must cover produced for every asset, plus `fee` for `fee_asset`.
    pub fn check(&self, fee_asset: &AssetId, fee: u64) -> Result<()> {
        let mut assets = self.assets();
        if fee > 0 && !assets.contains(fee_asset) {
            assets.push(*fee_asset);
        }

        for asset in assets {
            let mut required = self.produced(&asset);
            if asset == *fee_asset {
                required = required.checked_add(fee).ok_or(LedgerError::Overflow)?;
            }

            let available = self.consumed(&asset);
            if available < required {
                return Err(LedgerError::InsufficientFunds { asset, required, available });
            }
        }
        Ok(())
    }

    /// Value of `asset` destroyed by the transaction. Producing more than is
    /// consumed is an error, never a zero burn.
    pub fn burned(&self, asset: &AssetId) -> Result<u64> {
        let consumed = self.consumed(asset);
        let produced = self.produced(asset);

        consumed.checked_sub(produced).ok_or(LedgerError::InsufficientFunds {
            asset: *asset,
            required: produced,
            available: consumed,
        })
    }
}

fn add(totals: &mut BTreeMap<AssetId, u64>, asset: AssetId, amount: u64) -> Result<()> {
    let total = totals.entry(asset).or_insert(0);
    *total = total.checked_add(amount).ok_or(LedgerError::Overflow)?;
    Ok(())
}

/// Amount of `asset` burned by `tx`, from its claimed amounts.
pub fn burned(tx: &UnsignedTx, asset: &AssetId) -> Result<u64> {
    Flow::of(tx)?.burned(asset)
}

/// Burn of every asset `tx` touches.
pub fn burn_report(tx: &UnsignedTx) -> Result<BTreeMap<AssetId, u64>> {
    let flow = Flow::of(tx)?;
    flow.assets()
        .into_iter()
        .map(|asset| Ok((asset, flow.burned(&asset)?)))
        .collect()
}
