use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::PublicationChange;
use super::domain::{
    Account, AccountId, Job, JobId, Order, OrderId, OrderStatus, Transaction,
};

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Owner of account records. Balance and deposit changes arrive only through the ledger.
pub trait AccountStore: Send + Sync {
    fn insert(&self, account: Account) -> Result<Account, RepositoryError>;
    fn update(&self, account: Account) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError>;
}

/// Job definitions plus the slot counter.
pub trait JobCatalog: Send + Sync {
    fn insert(&self, job: Job) -> Result<Job, RepositoryError>;
    fn fetch(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    fn list(&self) -> Result<Vec<Job>, RepositoryError>;
    /// Replace the editable fields of a job. `applied_count` and the publication flags of the
    /// stored record are kept; shrinking `total_slots` below `applied_count` is a `Conflict`.
    fn update_details(&self, job: Job) -> Result<Job, RepositoryError>;
    fn remove(&self, id: &JobId) -> Result<Job, RepositoryError>;
    /// Increment `applied_count` only while it is below `total_slots`. `Ok(None)` means full.
    fn reserve_slot(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    /// Roll back a reservation whose order could not be stored.
    fn release_slot(&self, id: &JobId) -> Result<(), RepositoryError>;
    /// Raise the published/frozen flags named by `change`. Flags are never lowered.
    fn raise_flags(
        &self,
        id: &JobId,
        change: PublicationChange,
    ) -> Result<Option<Job>, RepositoryError>;
}

pub trait OrderRepository: Send + Sync {
    fn insert(&self, order: Order) -> Result<Order, RepositoryError>;
    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    /// Persist `order` only when the stored status still equals `expected`.
    fn replace(&self, order: Order, expected: OrderStatus) -> Result<(), RepositoryError>;
    fn for_account(&self, account_id: &AccountId) -> Result<Vec<Order>, RepositoryError>;
    fn for_account_and_job(
        &self,
        account_id: &AccountId,
        job_id: &JobId,
    ) -> Result<Vec<Order>, RepositoryError>;
    fn count_for_job(&self, job_id: &JobId) -> Result<usize, RepositoryError>;
    /// Up to `limit` `Applied` orders whose snapshot deadline is before `now`, earliest
    /// deadline first.
    fn overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, RepositoryError>;
}

/// Append-only transaction storage, returned in append order.
pub trait TransactionLog: Send + Sync {
    fn append(&self, transaction: Transaction) -> Result<Transaction, RepositoryError>;
    fn for_account(&self, account_id: &AccountId) -> Result<Vec<Transaction>, RepositoryError>;
}

/// Outbound notification hook (push, e-mail, in-app inbox adapters).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: OrderNotification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub template: String,
    pub account_id: AccountId,
    pub order_id: OrderId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
