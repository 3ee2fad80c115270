use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use super::transitions::{admin_transition_allowed, submission_target};
use crate::config::MarketConfig;
use crate::marketplace::accounts::require_admin;
use crate::marketplace::domain::{
    AccountId, Actor, JobId, JobSnapshot, Order, OrderId, OrderStatus,
};
use crate::marketplace::eligibility::{Admission, DenialReason, EligibilityEvaluator};
use crate::marketplace::error::MarketError;
use crate::marketplace::ledger::rewards::OWNER_CANCEL_PENALTY;
use crate::marketplace::ledger::BalanceLedger;
use crate::marketplace::locks::KeyedLocks;
use crate::marketplace::repository::{
    JobCatalog, NotificationPublisher, OrderNotification, OrderRepository, RepositoryError,
};

static ORDER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_order_identity(now: DateTime<Utc>) -> (OrderId, String) {
    let sequence = ORDER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let id = OrderId(format!("ord-{sequence:06}"));
    let number = format!("TK{}{sequence:06}", now.format("%Y%m%d%H%M%S"));
    (id, number)
}

/// Tunables for the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub submission_cooldown: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            submission_cooldown: Duration::seconds(60),
        }
    }
}

impl From<&MarketConfig> for LifecyclePolicy {
    fn from(config: &MarketConfig) -> Self {
        let cooldown = Duration::from_std(config.submission_cooldown)
            .unwrap_or_else(|_| Duration::seconds(60));
        Self {
            submission_cooldown: cooldown,
        }
    }
}

/// Per-account sliding window on submissions.
#[derive(Default)]
struct SubmissionCooldown {
    last_submission: Mutex<HashMap<AccountId, DateTime<Utc>>>,
}

impl SubmissionCooldown {
    /// Stamp `now` for the account unless its previous stamp is still inside the window.
    /// Returns the replaced stamp so a failed write can restore it.
    fn try_acquire(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Option<DateTime<Utc>>, MarketError> {
        let mut stamps = self
            .last_submission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = stamps.get(account_id) {
            let open_at = *last + window;
            if now < open_at {
                let remaining = (open_at - now).num_milliseconds();
                let retry_after_secs = ((remaining + 999) / 1000).max(1) as u64;
                return Err(MarketError::TooManyRequests {
                    retry_after_secs,
                    window_secs: window.num_seconds().max(0) as u64,
                });
            }
        }

        Ok(stamps.insert(account_id.clone(), now))
    }

    fn restore(&self, account_id: &AccountId, previous: Option<DateTime<Utc>>) {
        let mut stamps = self
            .last_submission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match previous {
            Some(stamp) => stamps.insert(account_id.clone(), stamp),
            None => stamps.remove(account_id),
        };
    }
}

/// Order lifecycle engine: applications, submissions, admin status changes, and cancellations.
pub struct OrderLifecycleService {
    jobs: Arc<dyn JobCatalog>,
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<BalanceLedger>,
    notifications: Arc<dyn NotificationPublisher>,
    evaluator: EligibilityEvaluator,
    policy: LifecyclePolicy,
    job_locks: Arc<KeyedLocks<JobId>>,
    order_locks: KeyedLocks<OrderId>,
    cooldown: SubmissionCooldown,
}

impl OrderLifecycleService {
    pub fn new(
        jobs: Arc<dyn JobCatalog>,
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<BalanceLedger>,
        notifications: Arc<dyn NotificationPublisher>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            jobs,
            orders,
            ledger,
            notifications,
            evaluator: EligibilityEvaluator::new(),
            policy,
            job_locks: Arc::new(KeyedLocks::default()),
            order_locks: KeyedLocks::default(),
            cooldown: SubmissionCooldown::default(),
        }
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    /// Per-job locks guarding slot reservation; the job board takes the same lock to delete.
    pub(crate) fn job_locks(&self) -> Arc<KeyedLocks<JobId>> {
        self.job_locks.clone()
    }

    /// Claim one slot of a job. The eligibility check, slot increment, and order insert run as
    /// one critical section per job, so concurrent applicants can never oversubscribe it.
    pub fn apply(
        &self,
        job_id: &JobId,
        actor: &Actor,
        tier_index: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Order, MarketError> {
        let account = self.ledger.accounts().get(&actor.account_id)?;
        if !account.is_active {
            return Err(MarketError::Forbidden("account is disabled".to_string()));
        }
        if let Some(until) = account.credit_ban_until.filter(|until| *until > now) {
            return Err(MarketError::Forbidden(format!(
                "account is suspended until {}",
                until.format("%Y-%m-%d %H:%M UTC")
            )));
        }

        let order = self.job_locks.with(job_id, || -> Result<Order, MarketError> {
            let job = self
                .jobs
                .fetch(job_id)?
                .ok_or_else(|| MarketError::missing("job", job_id))?;
            let history = self.orders.for_account_and_job(&account.id, job_id)?;

            let (amount, tier_label) =
                match self
                    .evaluator
                    .evaluate(&job, &account, &history, now, tier_index)
                {
                    Admission::Admit { amount, tier_label } => (amount, tier_label),
                    Admission::Deny(reason) => {
                        info!(job_id = %job_id, account_id = %account.id, %reason, "application denied");
                        return Err(MarketError::Denied(reason));
                    }
                };

            let reserved = self
                .jobs
                .reserve_slot(job_id)?
                .ok_or(MarketError::Denied(DenialReason::SlotsFull))?;

            let (id, order_number) = next_order_identity(now);
            let mut order = Order {
                id,
                order_number,
                account_id: account.id.clone(),
                job_id: job_id.clone(),
                status: OrderStatus::Applied,
                snapshot: JobSnapshot {
                    title: reserved.title.clone(),
                    amount,
                    tier_label,
                    deadline: reserved.deadline,
                    categories: reserved.categories.clone(),
                },
                description: None,
                evidence: Vec::new(),
                timeline: Vec::new(),
            };
            order.transition(OrderStatus::Applied, now, actor);

            match self.orders.insert(order) {
                Ok(stored) => Ok(stored),
                Err(insert_error) => {
                    if let Err(release_error) = self.jobs.release_slot(job_id) {
                        error!(job_id = %job_id, %release_error, "failed to release reserved slot");
                    }
                    Err(insert_error.into())
                }
            }
        })?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            job_id = %order.job_id,
            account_id = %order.account_id,
            amount = %order.snapshot.amount,
            "application accepted"
        );
        self.notify("order_accepted", &order, None);
        Ok(order)
    }

    /// Record proof of completion for an `Applied` order.
    pub fn submit(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        description: Option<String>,
        evidence: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, MarketError> {
        let order = self.order_locks.with(order_id, || -> Result<Order, MarketError> {
            let mut order = self.fetch(order_id)?;
            if !actor.is_admin() && !actor.owns(&order.account_id) {
                return Err(MarketError::Forbidden(
                    "only the order owner may submit proof".to_string(),
                ));
            }
            if order.status != OrderStatus::Applied {
                return Err(MarketError::BadRequest(format!(
                    "order is {}, only applied orders accept submissions",
                    order.status
                )));
            }

            let description = description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty());
            let evidence: Vec<String> = evidence
                .into_iter()
                .map(|file| file.trim().to_string())
                .filter(|file| !file.is_empty())
                .collect();

            let previous_stamp = if actor.is_admin() {
                None
            } else {
                Some(self.cooldown.try_acquire(
                    &actor.account_id,
                    now,
                    self.policy.submission_cooldown,
                )?)
            };

            let next = submission_target(description.as_deref(), &evidence);
            order.description = description;
            order.evidence = evidence;
            order.transition(next, now, actor);

            if let Err(write_error) = self.orders.replace(order.clone(), OrderStatus::Applied) {
                if let Some(previous) = previous_stamp {
                    self.cooldown.restore(&actor.account_id, previous);
                }
                return Err(concurrent_write(write_error));
            }
            Ok(order)
        })?;

        info!(order_id = %order.id, status = %order.status, "order submitted");
        self.notify("order_status_changed", &order, Some(OrderStatus::Applied));
        Ok(order)
    }

    /// Admin status change along the ordered transitions. Entering `Completed` pays the
    /// snapshot amount; the payout is reversed if the status cannot be stored.
    pub fn set_status(
        &self,
        order_id: &OrderId,
        new_status: OrderStatus,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Order, MarketError> {
        require_admin(actor, "change order status")?;
        if new_status == OrderStatus::Cancelled {
            return self.cancel(order_id, actor, now);
        }

        let (order, previous) = self
            .order_locks
            .with(order_id, || -> Result<(Order, OrderStatus), MarketError> {
                let mut order = self.fetch(order_id)?;
                let previous = order.status;
                if previous.is_terminal() {
                    return Err(MarketError::BadRequest(format!(
                        "order {} is already {previous}",
                        order.order_number
                    )));
                }
                if !admin_transition_allowed(previous, new_status) {
                    return Err(MarketError::BadRequest(format!(
                        "cannot move order from {previous} to {new_status}"
                    )));
                }

                let stored = order.clone();
                order.transition(new_status, now, actor);

                if new_status != OrderStatus::Completed {
                    self.orders
                        .replace(order.clone(), previous)
                        .map_err(concurrent_write)?;
                    return Ok((order, previous));
                }

                let settlement = self.ledger.settle_order(
                    &order.account_id,
                    &order.id,
                    order.snapshot.amount,
                    &format!("payout for order {}", order.order_number),
                    now,
                    || {
                        self.orders
                            .replace(order.clone(), previous)
                            .map_err(concurrent_write)
                    },
                    || {
                        self.orders
                            .replace(stored, OrderStatus::Completed)
                            .map_err(MarketError::from)
                    },
                )?;

                info!(
                    order_id = %order.id,
                    transaction_id = %settlement.transaction.id,
                    experience = settlement.experience_gained,
                    credit_score = settlement.credit.current,
                    "order settled"
                );
                Ok((order, previous))
            })?;

        info!(order_id = %order.id, from = %previous, to = %order.status, "order status changed");
        self.notify("order_status_changed", &order, Some(previous));
        Ok(order)
    }

    /// Owners may cancel before submission and lose one credit point; administrators may cancel
    /// any open order without penalty. If the penalty cannot be stored the order stays open.
    pub fn cancel(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Order, MarketError> {
        let (order, previous) = self
            .order_locks
            .with(order_id, || -> Result<(Order, OrderStatus), MarketError> {
                let mut order = self.fetch(order_id)?;
                let previous = order.status;

                if actor.is_admin() {
                    if previous.is_terminal() {
                        return Err(MarketError::BadRequest(format!(
                            "order {} is already {previous}",
                            order.order_number
                        )));
                    }
                } else if actor.owns(&order.account_id) {
                    if previous != OrderStatus::Applied {
                        return Err(MarketError::BadRequest(format!(
                            "order is {previous}, only applied orders can be cancelled"
                        )));
                    }
                } else {
                    return Err(MarketError::Forbidden(
                        "only the order owner may cancel it".to_string(),
                    ));
                }

                let stored = order.clone();
                order.transition(OrderStatus::Cancelled, now, actor);
                self.orders
                    .replace(order.clone(), previous)
                    .map_err(concurrent_write)?;

                if !actor.is_admin() {
                    let penalty = u8::try_from(OWNER_CANCEL_PENALTY).unwrap_or(u8::MAX);
                    if let Err(penalty_error) = self.ledger.penalize(&order.account_id, penalty, now)
                    {
                        if let Err(undo_error) =
                            self.orders.replace(stored, OrderStatus::Cancelled)
                        {
                            error!(
                                order_id = %order.id,
                                %undo_error,
                                "cancellation penalty failed and the order could not be reopened"
                            );
                        }
                        return Err(penalty_error);
                    }
                }
                Ok((order, previous))
            })?;

        info!(order_id = %order.id, by_admin = actor.is_admin(), "order cancelled");
        self.notify("order_status_changed", &order, Some(previous));
        Ok(order)
    }

    /// Cancel `Applied` orders whose snapshot deadline has passed. No penalty is applied.
    pub fn expire_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, MarketError> {
        let candidates = self.orders.overdue(now, limit)?;
        let system = Actor::system();
        let mut expired = Vec::new();

        for candidate in candidates {
            let outcome = self
                .order_locks
                .with(&candidate.id, || -> Result<Option<Order>, MarketError> {
                    let mut order = self.fetch(&candidate.id)?;
                    if order.status != OrderStatus::Applied {
                        return Ok(None);
                    }
                    order.transition(OrderStatus::Cancelled, now, &system);
                    match self.orders.replace(order.clone(), OrderStatus::Applied) {
                        Ok(()) => Ok(Some(order)),
                        Err(RepositoryError::Conflict) => Ok(None),
                        Err(other) => Err(MarketError::from(other)),
                    }
                })?;

            if let Some(order) = outcome {
                info!(order_id = %order.id, "overdue order expired");
                self.notify("order_status_changed", &order, Some(OrderStatus::Applied));
                expired.push(order);
            }
        }

        Ok(expired)
    }

    pub fn get(&self, order_id: &OrderId, actor: &Actor) -> Result<Order, MarketError> {
        let order = self.fetch(order_id)?;
        if !actor.is_admin() && !actor.owns(&order.account_id) {
            return Err(MarketError::Forbidden(
                "orders are visible to their owner and administrators".to_string(),
            ));
        }
        Ok(order)
    }

    pub fn list_for_account(
        &self,
        account_id: &AccountId,
        actor: &Actor,
    ) -> Result<Vec<Order>, MarketError> {
        if !actor.is_admin() && !actor.owns(account_id) {
            return Err(MarketError::Forbidden(
                "orders are visible to their owner and administrators".to_string(),
            ));
        }
        Ok(self.orders.for_account(account_id)?)
    }

    fn fetch(&self, order_id: &OrderId) -> Result<Order, MarketError> {
        self.orders
            .fetch(order_id)?
            .ok_or_else(|| MarketError::missing("order", order_id))
    }

    /// Fire-and-forget; delivery failures are logged and never undo the operation.
    fn notify(&self, template: &str, order: &Order, previous: Option<OrderStatus>) {
        let mut details = BTreeMap::new();
        details.insert("order_number".to_string(), order.order_number.clone());
        details.insert("status".to_string(), order.status.label().to_string());
        details.insert("job_title".to_string(), order.snapshot.title.clone());
        if let Some(previous) = previous {
            details.insert("previous_status".to_string(), previous.label().to_string());
        }

        let notification = OrderNotification {
            template: template.to_string(),
            account_id: order.account_id.clone(),
            order_id: order.id.clone(),
            details,
        };

        if let Err(notify_error) = self.notifications.publish(notification) {
            warn!(order_id = %order.id, template, %notify_error, "notification dropped");
        }
    }
}

fn concurrent_write(error: RepositoryError) -> MarketError {
    match error {
        RepositoryError::Conflict => MarketError::BadRequest(
            "order was modified concurrently, reload and retry".to_string(),
        ),
        other => other.into(),
    }
}
