use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::config::MarketConfig;
use crate::marketplace::catalog::JobDraft;
use crate::marketplace::domain::{
    Account, AccountId, Actor, AmountLevel, Job, JobId, JobSnapshot, Order, OrderId, OrderStatus,
    Transaction,
};
use crate::marketplace::memory::{
    MemoryAccountStore, MemoryJobCatalog, MemoryNotifications, MemoryOrderRepository,
    MemoryTransactionLog,
};
use crate::marketplace::repository::{
    AccountStore, NotificationPublisher, NotifyError, OrderNotification, OrderRepository,
    RepositoryError, TransactionLog,
};
use crate::marketplace::{MarketStores, Marketplace};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0)
        .single()
        .expect("valid time")
}

pub(super) fn admin() -> Actor {
    Actor::admin(AccountId::new("admin-1"))
}

pub(super) fn market() -> (Marketplace, Arc<MemoryNotifications>) {
    Marketplace::in_memory(&MarketConfig::default())
}

pub(super) fn market_with_credit(score: u8) -> Marketplace {
    let config = MarketConfig {
        default_credit_score: score,
        ..MarketConfig::default()
    };
    Marketplace::in_memory(&config).0
}

/// Marketplace over caller-supplied order, ledger, and notification adapters.
pub(super) fn market_with(
    orders: Arc<dyn OrderRepository>,
    transactions: Arc<dyn TransactionLog>,
    notifications: Arc<dyn NotificationPublisher>,
) -> Marketplace {
    let stores = MarketStores {
        accounts: Arc::new(MemoryAccountStore::default()),
        jobs: Arc::new(MemoryJobCatalog::default()),
        orders,
        transactions,
        notifications,
    };
    Marketplace::new(stores, &MarketConfig::default())
}

/// Marketplace whose account records live in `accounts`.
pub(super) fn market_with_accounts(accounts: Arc<dyn AccountStore>) -> Marketplace {
    let stores = MarketStores {
        accounts,
        jobs: Arc::new(MemoryJobCatalog::default()),
        orders: Arc::new(MemoryOrderRepository::default()),
        transactions: Arc::new(MemoryTransactionLog::default()),
        notifications: Arc::new(MemoryNotifications::default()),
    };
    Marketplace::new(stores, &MarketConfig::default())
}

pub(super) fn draft(title: &str, total_slots: u32, amount: Decimal) -> JobDraft {
    JobDraft {
        title: title.to_string(),
        description: "Photograph the storefront and upload the receipt".to_string(),
        categories: vec!["field".to_string()],
        total_slots,
        amount,
        amount_levels: Vec::new(),
        publish: true,
        scheduled_at: None,
        end_at: None,
        deadline: None,
        is_limited_time: false,
        auto_freeze: false,
        is_repeatable: false,
        deposit_requirement: Decimal::ZERO,
        kyc_required: false,
    }
}

pub(super) fn open_job(market: &Marketplace, total_slots: u32, amount: Decimal) -> Job {
    market
        .jobs
        .create(&admin(), draft("Storefront check", total_slots, amount), now())
        .expect("job created")
}

pub(super) fn worker(market: &Marketplace, id: &str) -> Actor {
    let account = market
        .accounts
        .register(AccountId::new(id), format!("Worker {id}"), now())
        .expect("account registered");
    Actor::user(account.id)
}

pub(super) fn account(market: &Marketplace, actor: &Actor) -> Account {
    market
        .accounts
        .get(&actor.account_id)
        .expect("account present")
}

/// Apply, then drive the order to `Reviewing` with a full submission.
pub(super) fn reviewing_order(market: &Marketplace, job: &Job, actor: &Actor) -> Order {
    let order = market
        .orders
        .apply(&job.id, actor, None, now())
        .expect("application accepted");
    market
        .orders
        .submit(
            &order.id,
            actor,
            Some("Done, photos attached".to_string()),
            vec!["uploads/photo-1.jpg".to_string()],
            now(),
        )
        .expect("submission accepted")
}

pub(super) fn listed_job(id: &str) -> Job {
    Job {
        id: JobId::new(id),
        title: "Survey".to_string(),
        description: String::new(),
        categories: vec!["survey".to_string()],
        total_slots: 3,
        applied_count: 0,
        amount: dec!(20),
        amount_levels: vec![
            AmountLevel {
                label: "basic".to_string(),
                amount: dec!(20),
            },
            AmountLevel {
                label: "premium".to_string(),
                amount: dec!(35),
            },
        ],
        is_frozen: false,
        is_published: true,
        scheduled_at: None,
        end_at: None,
        deadline: None,
        is_limited_time: false,
        auto_freeze: false,
        is_repeatable: false,
        deposit_requirement: Decimal::ZERO,
        kyc_required: false,
        created_at: now(),
    }
}

pub(super) fn prior_order(job: &Job, account_id: &AccountId, status: OrderStatus) -> Order {
    Order {
        id: OrderId::new(format!("ord-prior-{}", status.label())),
        order_number: format!("TKPRIOR{}", status.label()),
        account_id: account_id.clone(),
        job_id: job.id.clone(),
        status,
        snapshot: JobSnapshot {
            title: job.title.clone(),
            amount: job.amount,
            tier_label: "standard".to_string(),
            deadline: None,
            categories: job.categories.clone(),
        },
        description: None,
        evidence: Vec::new(),
        timeline: Vec::new(),
    }
}

/// Order store whose `replace` can be switched to fail while reads and inserts keep working.
#[derive(Default)]
pub(super) struct FlakyOrderRepository {
    inner: MemoryOrderRepository,
    fail_replace: AtomicBool,
    fail_insert: AtomicBool,
    count_delay_ms: AtomicU64,
}

impl FlakyOrderRepository {
    pub(super) fn fail_replace(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }

    pub(super) fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    /// Stall `count_for_job` after it has read the store.
    pub(super) fn slow_count(&self, millis: u64) {
        self.count_delay_ms.store(millis, Ordering::SeqCst);
    }
}

impl OrderRepository for FlakyOrderRepository {
    fn insert(&self, order: Order) -> Result<Order, RepositoryError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        self.inner.insert(order)
    }

    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn replace(&self, order: Order, expected: OrderStatus) -> Result<(), RepositoryError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        self.inner.replace(order, expected)
    }

    fn for_account(&self, account_id: &AccountId) -> Result<Vec<Order>, RepositoryError> {
        self.inner.for_account(account_id)
    }

    fn for_account_and_job(
        &self,
        account_id: &AccountId,
        job_id: &JobId,
    ) -> Result<Vec<Order>, RepositoryError> {
        self.inner.for_account_and_job(account_id, job_id)
    }

    fn count_for_job(&self, job_id: &JobId) -> Result<usize, RepositoryError> {
        let count = self.inner.count_for_job(job_id)?;
        let delay = self.count_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(std::time::Duration::from_millis(delay));
        }
        Ok(count)
    }

    fn overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        self.inner.overdue(now, limit)
    }
}

/// Account store whose `update` can be switched to fail while reads keep working.
#[derive(Default)]
pub(super) struct FlakyAccountStore {
    inner: MemoryAccountStore,
    fail_update: AtomicBool,
}

impl FlakyAccountStore {
    pub(super) fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }
}

impl AccountStore for FlakyAccountStore {
    fn insert(&self, account: Account) -> Result<Account, RepositoryError> {
        self.inner.insert(account)
    }

    fn update(&self, account: Account) -> Result<(), RepositoryError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("account store offline".to_string()));
        }
        self.inner.update(account)
    }

    fn fetch(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError> {
        self.inner.fetch(id)
    }
}

/// Transaction log that refuses every append once switched off.
#[derive(Default)]
pub(super) struct FlakyTransactionLog {
    inner: MemoryTransactionLog,
    fail_append: AtomicBool,
}

impl FlakyTransactionLog {
    pub(super) fn fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }
}

impl TransactionLog for FlakyTransactionLog {
    fn append(&self, transaction: Transaction) -> Result<Transaction, RepositoryError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("ledger offline".to_string()));
        }
        self.inner.append(transaction)
    }

    fn for_account(&self, account_id: &AccountId) -> Result<Vec<Transaction>, RepositoryError> {
        self.inner.for_account(account_id)
    }
}

pub(super) struct FailingNotifications;

impl NotificationPublisher for FailingNotifications {
    fn publish(&self, _notification: OrderNotification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay refused".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
