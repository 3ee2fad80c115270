//! In-process storage adapters used by the HTTP service, the CLI demo, and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::catalog::PublicationChange;
use super::domain::{
    Account, AccountId, Job, JobId, Order, OrderId, OrderStatus, Transaction,
};
use super::repository::{
    AccountStore, JobCatalog, NotificationPublisher, NotifyError, OrderNotification,
    OrderRepository, RepositoryError, TransactionLog,
};

fn acquire<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("storage mutex poisoned".to_string()))
}

#[derive(Default)]
pub struct MemoryAccountStore {
    records: Mutex<HashMap<AccountId, Account>>,
}

impl AccountStore for MemoryAccountStore {
    fn insert(&self, account: Account) -> Result<Account, RepositoryError> {
        let mut records = acquire(&self.records)?;
        if records.contains_key(&account.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    fn update(&self, account: Account) -> Result<(), RepositoryError> {
        let mut records = acquire(&self.records)?;
        match records.get_mut(&account.id) {
            Some(slot) => {
                *slot = account;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError> {
        Ok(acquire(&self.records)?.get(id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryJobCatalog {
    records: Mutex<BTreeMap<JobId, Job>>,
}

impl JobCatalog for MemoryJobCatalog {
    fn insert(&self, job: Job) -> Result<Job, RepositoryError> {
        let mut records = acquire(&self.records)?;
        if records.contains_key(&job.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    fn fetch(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(acquire(&self.records)?.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Job>, RepositoryError> {
        Ok(acquire(&self.records)?.values().cloned().collect())
    }

    fn update_details(&self, job: Job) -> Result<Job, RepositoryError> {
        let mut records = acquire(&self.records)?;
        let stored = records.get_mut(&job.id).ok_or(RepositoryError::NotFound)?;
        if job.total_slots < stored.applied_count {
            return Err(RepositoryError::Conflict);
        }

        let Job {
            applied_count,
            is_frozen,
            is_published,
            ..
        } = *stored;
        *stored = Job {
            applied_count,
            is_frozen,
            is_published,
            ..job
        };
        Ok(stored.clone())
    }

    fn remove(&self, id: &JobId) -> Result<Job, RepositoryError> {
        acquire(&self.records)?
            .remove(id)
            .ok_or(RepositoryError::NotFound)
    }

    fn reserve_slot(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let mut records = acquire(&self.records)?;
        let job = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if job.applied_count >= job.total_slots {
            return Ok(None);
        }
        job.applied_count += 1;
        Ok(Some(job.clone()))
    }

    fn release_slot(&self, id: &JobId) -> Result<(), RepositoryError> {
        let mut records = acquire(&self.records)?;
        let job = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        job.applied_count = job.applied_count.saturating_sub(1);
        Ok(())
    }

    fn raise_flags(
        &self,
        id: &JobId,
        change: PublicationChange,
    ) -> Result<Option<Job>, RepositoryError> {
        let mut records = acquire(&self.records)?;
        Ok(records.get_mut(id).map(|job| {
            job.is_published |= change.publish;
            job.is_frozen |= change.freeze;
            job.clone()
        }))
    }
}

#[derive(Default)]
pub struct MemoryOrderRepository {
    records: Mutex<BTreeMap<OrderId, Order>>,
}

impl OrderRepository for MemoryOrderRepository {
    fn insert(&self, order: Order) -> Result<Order, RepositoryError> {
        let mut records = acquire(&self.records)?;
        if records.contains_key(&order.id)
            || records
                .values()
                .any(|existing| existing.order_number == order.order_number)
        {
            return Err(RepositoryError::Conflict);
        }
        records.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(acquire(&self.records)?.get(id).cloned())
    }

    fn replace(&self, order: Order, expected: OrderStatus) -> Result<(), RepositoryError> {
        let mut records = acquire(&self.records)?;
        let stored = records.get_mut(&order.id).ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict);
        }
        *stored = order;
        Ok(())
    }

    fn for_account(&self, account_id: &AccountId) -> Result<Vec<Order>, RepositoryError> {
        Ok(acquire(&self.records)?
            .values()
            .filter(|order| &order.account_id == account_id)
            .cloned()
            .collect())
    }

    fn for_account_and_job(
        &self,
        account_id: &AccountId,
        job_id: &JobId,
    ) -> Result<Vec<Order>, RepositoryError> {
        Ok(acquire(&self.records)?
            .values()
            .filter(|order| &order.account_id == account_id && &order.job_id == job_id)
            .cloned()
            .collect())
    }

    fn count_for_job(&self, job_id: &JobId) -> Result<usize, RepositoryError> {
        Ok(acquire(&self.records)?
            .values()
            .filter(|order| &order.job_id == job_id)
            .count())
    }

    fn overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let mut overdue: Vec<Order> = acquire(&self.records)?
            .values()
            .filter(|order| {
                order.status == OrderStatus::Applied
                    && order.snapshot.deadline.is_some_and(|deadline| deadline < now)
            })
            .cloned()
            .collect();
        overdue.sort_by(|a, b| {
            a.snapshot
                .deadline
                .cmp(&b.snapshot.deadline)
                .then_with(|| a.id.cmp(&b.id))
        });
        overdue.truncate(limit);
        Ok(overdue)
    }
}

#[derive(Default)]
pub struct MemoryTransactionLog {
    entries: Mutex<Vec<Transaction>>,
}

impl TransactionLog for MemoryTransactionLog {
    fn append(&self, transaction: Transaction) -> Result<Transaction, RepositoryError> {
        let mut entries = acquire(&self.entries)?;
        if entries.iter().any(|entry| entry.id == transaction.id) {
            return Err(RepositoryError::Conflict);
        }
        entries.push(transaction.clone());
        Ok(transaction)
    }

    fn for_account(&self, account_id: &AccountId) -> Result<Vec<Transaction>, RepositoryError> {
        Ok(acquire(&self.entries)?
            .iter()
            .filter(|entry| &entry.account_id == account_id)
            .cloned()
            .collect())
    }
}

/// Notification sink that keeps every event for inspection.
#[derive(Default)]
pub struct MemoryNotifications {
    events: Mutex<Vec<OrderNotification>>,
}

impl MemoryNotifications {
    pub fn events(&self) -> Vec<OrderNotification> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, notification: OrderNotification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|_| NotifyError::Transport("notification buffer poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
