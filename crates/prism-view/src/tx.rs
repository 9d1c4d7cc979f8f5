//! Transaction collaborator interfaces.
//!
//! The surrounding persistence layer owns the transaction. Updaters only need to
//! know whether one is active, run a parameterized update in it, and hook a
//! callback onto its completion.

use prism_core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Committed,
    RolledBack,
    Unknown,
}

/// Callback run around transaction completion.
pub trait TransactionSynchronization: Send {
    fn before_completion(&self) {}

    fn after_completion(&self, status: TransactionStatus);
}

#[cfg_attr(test, mockall::automock)]
pub trait TransactionContext {
    fn is_active(&self) -> bool;

    /// Execute `statement` with named `bindings`, returning the affected row
    /// count.
    fn execute_update(&self, statement: &str, bindings: &[(String, Value)]) -> anyhow::Result<u64>;

    fn register_synchronization(
        &self,
        synchronization: Box<dyn TransactionSynchronization>,
    ) -> anyhow::Result<()>;
}
