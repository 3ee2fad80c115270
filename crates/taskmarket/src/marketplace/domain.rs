use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Opaque account identifier supplied by the auth collaborator.
    AccountId
);
identifier!(
    /// Identifier for a posted job.
    JobId
);
identifier!(
    /// Identifier for one account's claim on a job slot.
    OrderId
);
identifier!(TransactionId);

/// Role resolved by the auth collaborator for the calling account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// The caller of a core operation. Identity is trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub account_id: AccountId,
    pub role: Role,
}

impl Actor {
    pub fn user(account_id: AccountId) -> Self {
        Self {
            account_id,
            role: Role::User,
        }
    }

    pub fn admin(account_id: AccountId) -> Self {
        Self {
            account_id,
            role: Role::Admin,
        }
    }

    /// Identity used for automated transitions such as sweeper expiries.
    pub fn system() -> Self {
        Self::admin(AccountId::new("system"))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, account_id: &AccountId) -> bool {
        &self.account_id == account_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
}

impl KycStatus {
    pub const fn label(self) -> &'static str {
        match self {
            KycStatus::Unverified => "unverified",
            KycStatus::Pending => "pending",
            KycStatus::Verified => "verified",
            KycStatus::Rejected => "rejected",
        }
    }
}

/// Balance, deposit, and standing for a marketplace member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub balance: Decimal,
    pub deposit: Decimal,
    pub kyc_status: KycStatus,
    pub credit_score: u8,
    pub credit_ban_until: Option<DateTime<Utc>>,
    pub experience: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        id: AccountId,
        display_name: impl Into<String>,
        credit_score: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            balance: Decimal::ZERO,
            deposit: Decimal::ZERO,
            kyc_status: KycStatus::Unverified,
            credit_score: credit_score.min(100),
            credit_ban_until: None,
            experience: 0,
            is_active: true,
            created_at: now,
        }
    }

    pub fn is_banned(&self, now: DateTime<Utc>) -> bool {
        self.credit_ban_until.map(|until| until > now).unwrap_or(false)
    }
}

/// One alternative payout a job offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountLevel {
    pub label: String,
    pub amount: Decimal,
}

/// A posted task with slot capacity, payout tiers, and eligibility gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub total_slots: u32,
    pub applied_count: u32,
    pub amount: Decimal,
    pub amount_levels: Vec<AmountLevel>,
    pub is_frozen: bool,
    pub is_published: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub is_limited_time: bool,
    pub auto_freeze: bool,
    pub is_repeatable: bool,
    pub deposit_requirement: Decimal,
    pub kyc_required: bool,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn has_open_slots(&self) -> bool {
        self.applied_count < self.total_slots
    }

    pub fn remaining_slots(&self) -> u32 {
        self.total_slots.saturating_sub(self.applied_count)
    }
}

/// Job fields frozen into an order at application time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub title: String,
    pub amount: Decimal,
    pub tier_label: String,
    pub deadline: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Applied,
    Submitted,
    Reviewing,
    PendingPayment,
    Completed,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OrderStatus::Applied => "applied",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Reviewing => "reviewing",
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let status = match normalized.as_str() {
            "applied" => OrderStatus::Applied,
            "submitted" => OrderStatus::Submitted,
            "reviewing" => OrderStatus::Reviewing,
            "pending_payment" | "pendingpayment" => OrderStatus::PendingPayment,
            "completed" => OrderStatus::Completed,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "rejected" => OrderStatus::Rejected,
            _ => return Err(UnknownLabel(value.to_string())),
        };
        Ok(status)
    }
}

/// Raised when a role or status label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown label '{0}'")]
pub struct UnknownLabel(pub String);

/// Timeline entry recorded for every transition an order undergoes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub actor: AccountId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub account_id: AccountId,
    pub job_id: JobId,
    pub status: OrderStatus,
    pub snapshot: JobSnapshot,
    pub description: Option<String>,
    pub evidence: Vec<String>,
    pub timeline: Vec<StatusChange>,
}

impl Order {
    /// Orders that still hold a claim on the job (anything but cancelled or rejected).
    pub fn blocks_reapplication(&self) -> bool {
        !matches!(self.status, OrderStatus::Cancelled | OrderStatus::Rejected)
    }

    pub fn stamped_at(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.timeline
            .iter()
            .rev()
            .find(|change| change.status == status)
            .map(|change| change.at)
    }

    pub(crate) fn transition(&mut self, status: OrderStatus, at: DateTime<Utc>, actor: &Actor) {
        self.status = status;
        self.timeline.push(StatusChange {
            status,
            at,
            actor: actor.account_id.clone(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Withdraw,
    Recharge,
    Commission,
}

impl TransactionKind {
    pub const fn label(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Recharge => "recharge",
            TransactionKind::Commission => "commission",
        }
    }

    pub const fn is_debit(self) -> bool {
        matches!(self, TransactionKind::Withdraw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Pending,
}

impl TransactionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Pending => "pending",
        }
    }
}

/// Append-only record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub order_id: Option<OrderId>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_snapshot: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_debit() {
            -self.amount
        } else {
            self.amount
        }
    }
}
