//! Balance ledger: a single mutable balance per account plus the append-only transaction log
//! that justifies every change to it.

mod export;
pub mod rewards;

pub use export::{export_csv, ExportError};
pub use rewards::CreditChange;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use super::accounts::AccountRegistry;
use super::domain::{
    Account, AccountId, OrderId, Transaction, TransactionId, TransactionKind, TransactionStatus,
};
use super::error::MarketError;
use super::repository::TransactionLog;
use rewards::{apply_credit_delta, completion_experience, COMPLETION_CREDIT_BONUS};

static TRANSACTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_transaction_id() -> TransactionId {
    let id = TRANSACTION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TransactionId(format!("txn-{id:08}"))
}

/// Income entry plus the rewards granted for a completed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub transaction: Transaction,
    pub experience_gained: u64,
    pub credit: CreditChange,
}

/// Replay of an account's transaction log against its stored balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerAudit {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub ledger_total: Decimal,
    pub entries: usize,
    /// Entries whose `balance_snapshot` disagrees with the running total at that point.
    pub snapshot_breaks: Vec<TransactionId>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_total && self.snapshot_breaks.is_empty()
    }
}

pub struct BalanceLedger {
    accounts: Arc<AccountRegistry>,
    transactions: Arc<dyn TransactionLog>,
}

impl BalanceLedger {
    pub fn new(accounts: Arc<AccountRegistry>, transactions: Arc<dyn TransactionLog>) -> Self {
        Self {
            accounts,
            transactions,
        }
    }

    pub fn accounts(&self) -> &Arc<AccountRegistry> {
        &self.accounts
    }

    /// Credit `amount` as income, optionally tagged with the order that earned it.
    pub fn credit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        order_id: Option<&OrderId>,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction, MarketError> {
        self.post(
            account_id,
            TransactionKind::Income,
            amount,
            order_id,
            description,
            now,
            |_| Ok(()),
        )
        .map(|(transaction, ())| transaction)
    }

    /// Debit `amount` as a withdrawal. Fails without side effects when the balance is short.
    pub fn debit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction, MarketError> {
        self.post(
            account_id,
            TransactionKind::Withdraw,
            amount,
            None,
            description,
            now,
            |_| Ok(()),
        )
        .map(|(transaction, ())| transaction)
    }

    pub fn recharge(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction, MarketError> {
        self.post(
            account_id,
            TransactionKind::Recharge,
            amount,
            None,
            description,
            now,
            |_| Ok(()),
        )
        .map(|(transaction, ())| transaction)
    }

    pub fn commission(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        order_id: Option<&OrderId>,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction, MarketError> {
        self.post(
            account_id,
            TransactionKind::Commission,
            amount,
            order_id,
            description,
            now,
            |_| Ok(()),
        )
        .map(|(transaction, ())| transaction)
    }

    /// Pay an order's snapshot amount, grant the completion rewards, and run `commit` (the
    /// order's status write) while the account lock is held. A failed `commit` puts the account
    /// record back and appends nothing. A failed append runs `undo` and puts the account back.
    /// An order that already has an income entry is never paid again.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn settle_order(
        &self,
        account_id: &AccountId,
        order_id: &OrderId,
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
        commit: impl FnOnce() -> Result<(), MarketError>,
        undo: impl FnOnce() -> Result<(), MarketError>,
    ) -> Result<Settlement, MarketError> {
        if amount <= Decimal::ZERO {
            return Err(MarketError::BadRequest(format!(
                "amount must be positive, got {amount}"
            )));
        }

        self.accounts.locked(account_id, || {
            let already_paid = self
                .transactions
                .for_account(account_id)?
                .iter()
                .any(|entry| {
                    entry.kind == TransactionKind::Income
                        && entry.order_id.as_ref() == Some(order_id)
                });
            if already_paid {
                return Err(MarketError::BadRequest(format!(
                    "order {order_id} has already been paid"
                )));
            }

            let original = self.accounts.get(account_id)?;
            let mut account = original.clone();
            let experience_gained = completion_experience(amount);
            account.balance += amount;
            account.experience = account.experience.saturating_add(experience_gained);
            let credit = apply_credit_delta(&mut account, COMPLETION_CREDIT_BONUS, now);

            let transaction = Transaction {
                id: next_transaction_id(),
                account_id: account_id.clone(),
                order_id: Some(order_id.clone()),
                kind: TransactionKind::Income,
                amount,
                balance_snapshot: account.balance,
                description: description.to_string(),
                status: TransactionStatus::Completed,
                created_at: now,
            };

            self.accounts.store().update(account)?;
            if let Err(commit_error) = commit() {
                self.restore(original, "order commit failure");
                return Err(commit_error);
            }

            match self.transactions.append(transaction) {
                Ok(stored) => {
                    info!(
                        account_id = %account_id,
                        order_id = %order_id,
                        transaction_id = %stored.id,
                        %amount,
                        balance = %stored.balance_snapshot,
                        "order payout recorded"
                    );
                    Ok(Settlement {
                        transaction: stored,
                        experience_gained,
                        credit,
                    })
                }
                Err(append_error) => {
                    if let Err(undo_error) = undo() {
                        error!(
                            order_id = %order_id,
                            %undo_error,
                            "payout not recorded and order completion could not be undone"
                        );
                    }
                    self.restore(original, "ledger append failure");
                    Err(append_error.into())
                }
            }
        })
    }

    /// Lower the credit score by `points`, applying the stacked ban rule.
    pub fn penalize(
        &self,
        account_id: &AccountId,
        points: u8,
        now: DateTime<Utc>,
    ) -> Result<CreditChange, MarketError> {
        let mut change = None;
        self.accounts.modify(account_id, |account| {
            change = Some(apply_credit_delta(account, -i32::from(points), now));
            Ok(())
        })?;
        let change = change.ok_or_else(|| MarketError::missing("account", account_id))?;

        if let Some(until) = change.ban_until {
            warn!(
                account_id = %account_id,
                score = change.current,
                ban_until = %until,
                "credit score penalty triggered ban"
            );
        } else {
            info!(account_id = %account_id, score = change.current, "credit score penalized");
        }
        Ok(change)
    }

    /// Move funds from the spendable balance into the security deposit.
    pub fn pay_deposit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Transaction, MarketError> {
        self.post(
            account_id,
            TransactionKind::Withdraw,
            amount,
            None,
            "security deposit payment",
            now,
            |account| {
                account.deposit += amount;
                Ok(())
            },
        )
        .map(|(transaction, ())| transaction)
    }

    /// Return funds from the security deposit to the spendable balance.
    pub fn refund_deposit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Transaction, MarketError> {
        self.post(
            account_id,
            TransactionKind::Recharge,
            amount,
            None,
            "security deposit refund",
            now,
            |account| {
                if account.deposit < amount {
                    return Err(MarketError::BadRequest(format!(
                        "deposit {} is smaller than requested refund {amount}",
                        account.deposit
                    )));
                }
                account.deposit -= amount;
                Ok(())
            },
        )
        .map(|(transaction, ())| transaction)
    }

    pub fn transactions(&self, account_id: &AccountId) -> Result<Vec<Transaction>, MarketError> {
        self.accounts.get(account_id)?;
        Ok(self.transactions.for_account(account_id)?)
    }

    pub fn audit(&self, account_id: &AccountId) -> Result<LedgerAudit, MarketError> {
        self.accounts.locked(account_id, || {
            let account = self.accounts.get(account_id)?;
            let entries = self.transactions.for_account(account_id)?;

            let mut running = Decimal::ZERO;
            let mut snapshot_breaks = Vec::new();
            for entry in &entries {
                running += entry.signed_amount();
                if entry.balance_snapshot != running {
                    snapshot_breaks.push(entry.id.clone());
                }
            }

            Ok(LedgerAudit {
                account_id: account.id,
                balance: account.balance,
                ledger_total: running,
                entries: entries.len(),
                snapshot_breaks,
            })
        })
    }

    /// Atomic read-modify-write of one account followed by the matching log append. If the
    /// append fails the account is written back to its previous state.
    #[allow(clippy::too_many_arguments)]
    fn post<T>(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
        amount: Decimal,
        order_id: Option<&OrderId>,
        description: &str,
        now: DateTime<Utc>,
        adjust: impl FnOnce(&mut Account) -> Result<T, MarketError>,
    ) -> Result<(Transaction, T), MarketError> {
        if amount <= Decimal::ZERO {
            return Err(MarketError::BadRequest(format!(
                "amount must be positive, got {amount}"
            )));
        }

        self.accounts.locked(account_id, || {
            let original = self.accounts.get(account_id)?;
            let mut account = original.clone();

            let balance = if kind.is_debit() {
                if account.balance < amount {
                    return Err(MarketError::InsufficientBalance {
                        available: account.balance,
                        requested: amount,
                    });
                }
                account.balance - amount
            } else {
                account.balance + amount
            };
            account.balance = balance;
            let extra = adjust(&mut account)?;

            let transaction = Transaction {
                id: next_transaction_id(),
                account_id: account_id.clone(),
                order_id: order_id.cloned(),
                kind,
                amount,
                balance_snapshot: balance,
                description: description.to_string(),
                status: TransactionStatus::Completed,
                created_at: now,
            };

            self.accounts.store().update(account)?;
            match self.transactions.append(transaction) {
                Ok(stored) => {
                    info!(
                        account_id = %account_id,
                        transaction_id = %stored.id,
                        kind = kind.label(),
                        %amount,
                        balance = %balance,
                        "ledger entry recorded"
                    );
                    Ok((stored, extra))
                }
                Err(append_error) => {
                    self.restore(original, "ledger append failure");
                    Err(append_error.into())
                }
            }
        })
    }

    /// Write back an account snapshot taken under the account lock.
    fn restore(&self, original: Account, cause: &str) {
        let account_id = original.id.clone();
        if let Err(restore_error) = self.accounts.store().update(original) {
            error!(
                account_id = %account_id,
                %restore_error,
                cause,
                "failed to restore account"
            );
        }
    }
}
