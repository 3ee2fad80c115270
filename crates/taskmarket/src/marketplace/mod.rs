//! Task marketplace domain.
//!
//! Services are synchronous and thread-safe; every store sits behind a trait object so the
//! HTTP service, the CLI demo, and tests can swap in their own adapters.

pub mod accounts;
pub mod catalog;
pub mod domain;
pub mod eligibility;
pub mod error;
pub mod ledger;
pub(crate) mod locks;
pub mod memory;
pub mod orders;
pub mod repository;
pub mod sweeper;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use accounts::AccountRegistry;
pub use catalog::{evaluate_publication_window, JobBoard, JobDraft, PublicationChange};
pub use domain::{
    Account, AccountId, Actor, AmountLevel, Job, JobId, JobSnapshot, KycStatus, Order, OrderId,
    OrderStatus, Role, StatusChange, Transaction, TransactionId, TransactionKind,
    TransactionStatus,
};
pub use eligibility::{Admission, DenialReason, EligibilityEvaluator, DEFAULT_TIER_LABEL};
pub use error::{ErrorKind, MarketError};
pub use ledger::{export_csv, BalanceLedger, CreditChange, ExportError, LedgerAudit, Settlement};
pub use orders::{marketplace_router, LifecyclePolicy, OrderLifecycleService};
pub use repository::{
    AccountStore, JobCatalog, NotificationPublisher, NotifyError, OrderNotification,
    OrderRepository, RepositoryError, TransactionLog,
};
pub use sweeper::{SweepReport, Sweeper};

use crate::config::MarketConfig;
use memory::{
    MemoryAccountStore, MemoryJobCatalog, MemoryNotifications, MemoryOrderRepository,
    MemoryTransactionLog,
};

/// Fully wired set of services sharing one set of stores.
#[derive(Clone)]
pub struct Marketplace {
    pub accounts: Arc<AccountRegistry>,
    pub ledger: Arc<BalanceLedger>,
    pub jobs: Arc<JobBoard>,
    pub orders: Arc<OrderLifecycleService>,
    pub sweeper: Arc<Sweeper>,
}

/// Storage and delivery adapters a [`Marketplace`] is assembled from.
pub struct MarketStores {
    pub accounts: Arc<dyn AccountStore>,
    pub jobs: Arc<dyn JobCatalog>,
    pub orders: Arc<dyn OrderRepository>,
    pub transactions: Arc<dyn TransactionLog>,
    pub notifications: Arc<dyn NotificationPublisher>,
}

impl Marketplace {
    pub fn new(stores: MarketStores, config: &MarketConfig) -> Self {
        let accounts = Arc::new(
            AccountRegistry::new(stores.accounts)
                .with_default_credit_score(config.default_credit_score),
        );
        let ledger = Arc::new(BalanceLedger::new(accounts.clone(), stores.transactions));
        let orders = Arc::new(OrderLifecycleService::new(
            stores.jobs.clone(),
            stores.orders.clone(),
            ledger.clone(),
            stores.notifications,
            LifecyclePolicy::from(config),
        ));
        let jobs = Arc::new(
            JobBoard::new(stores.jobs.clone(), stores.orders)
                .sharing_job_locks(orders.job_locks()),
        );
        let sweeper = Arc::new(Sweeper::new(stores.jobs, orders.clone()));

        Self {
            accounts,
            ledger,
            jobs,
            orders,
            sweeper,
        }
    }

    /// Wire every service over fresh in-memory stores. The notification sink is returned so
    /// callers can inspect delivered events.
    pub fn in_memory(config: &MarketConfig) -> (Self, Arc<MemoryNotifications>) {
        let notifications = Arc::new(MemoryNotifications::default());
        let stores = MarketStores {
            accounts: Arc::new(MemoryAccountStore::default()),
            jobs: Arc::new(MemoryJobCatalog::default()),
            orders: Arc::new(MemoryOrderRepository::default()),
            transactions: Arc::new(MemoryTransactionLog::default()),
            notifications: notifications.clone(),
        };
        (Self::new(stores, config), notifications)
    }
}
