//! Transaction verification: stateless checks, fee/burn accounting and
//! stateful execution.

pub mod execution;
pub mod fees;
pub mod validation;

pub use execution::{semantic_verify, MutationDescriptor, StateView};
pub use fees::{burn_report, burned, Flow};
pub use validation::{TxValidator, Verified};
