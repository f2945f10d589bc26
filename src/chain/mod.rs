//! Chain-level acceptance: the ledger that commits verified transactions
//! and the actor that owns it.

pub mod actor;
pub mod ledger;

pub use actor::{ChainActor, ChainCommand, ChainHandle};
pub use ledger::{Clock, FixedClock, Ledger, LedgerStats, SystemClock};
