//! Boundary making "process event + acknowledge message" a single unit of work.

use async_trait::async_trait;

use crate::core::DispatchError;

/// An open unit of work.
#[async_trait]
pub trait Transaction: Send {
    /// Make the unit of work's side effects durable.
    async fn commit(self: Box<Self>) -> Result<(), DispatchError>;

    /// Discard the unit of work's side effects.
    async fn rollback(self: Box<Self>) -> Result<(), DispatchError>;
}

/// Starts units of work around event processing.
#[async_trait]
pub trait TransactionBoundary: Send + Sync {
    /// Begin a unit of work.
    async fn begin(&self) -> Result<Box<dyn Transaction>, DispatchError>;
}

/// Boundary for processors whose effects need no transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactions;

struct NoTransaction;

#[async_trait]
impl Transaction for NoTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DispatchError> {
        Ok(())
    }
}

#[async_trait]
impl TransactionBoundary for NoTransactions {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DispatchError> {
        Ok(Box::new(NoTransaction))
    }
}
