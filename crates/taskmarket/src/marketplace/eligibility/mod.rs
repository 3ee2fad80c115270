//! Pure admission decision for a job application.

mod policy;

pub use policy::DenialReason;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{Account, Job, KycStatus, Order, OrderStatus};

/// Tier label recorded when the applicant does not pick one of the job's amount levels.
pub const DEFAULT_TIER_LABEL: &str = "standard";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Admission {
    Admit { amount: Decimal, tier_label: String },
    Deny(DenialReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit { .. })
    }
}

/// Stateless evaluator; calling it never consumes slots or mutates records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Checks run in a fixed order and the first failure is reported, so the applicant sees the
    /// most actionable blocker. `history` may contain orders for other jobs; they are ignored.
    pub fn evaluate(
        &self,
        job: &Job,
        account: &Account,
        history: &[Order],
        now: DateTime<Utc>,
        tier_index: Option<usize>,
    ) -> Admission {
        match check(job, account, history, now, tier_index) {
            Ok((amount, tier_label)) => Admission::Admit { amount, tier_label },
            Err(reason) => Admission::Deny(reason),
        }
    }
}

fn check(
    job: &Job,
    account: &Account,
    history: &[Order],
    now: DateTime<Utc>,
    tier_index: Option<usize>,
) -> Result<(Decimal, String), DenialReason> {
    if !job.is_published {
        return Err(DenialReason::NotPublished);
    }

    if job.is_frozen {
        return Err(DenialReason::Frozen);
    }

    if job.is_limited_time {
        if let Some(end_at) = job.end_at {
            if now > end_at {
                return Err(DenialReason::Ended { ended_at: end_at });
            }
        }
    }

    if !job.has_open_slots() {
        return Err(DenialReason::SlotsFull);
    }

    if job.kyc_required && account.kyc_status != KycStatus::Verified {
        return Err(DenialReason::KycRequired {
            status: account.kyc_status,
        });
    }

    if job.deposit_requirement > Decimal::ZERO && account.deposit < job.deposit_requirement {
        return Err(DenialReason::InsufficientDeposit {
            required: job.deposit_requirement,
            current: account.deposit,
        });
    }

    if !job.is_repeatable {
        let blocking = history.iter().find(|order| {
            order.job_id == job.id && order.account_id == account.id && order.blocks_reapplication()
        });
        if let Some(order) = blocking {
            let order_id = order.id.clone();
            return Err(if order.status == OrderStatus::Completed {
                DenialReason::AlreadyCompleted { order_id }
            } else {
                DenialReason::ActiveOrderExists { order_id }
            });
        }
    }

    match tier_index {
        Some(index) => job
            .amount_levels
            .get(index)
            .map(|level| (level.amount, level.label.clone()))
            .ok_or(DenialReason::UnknownTier {
                index,
                available: job.amount_levels.len(),
            }),
        None => Ok((job.amount, DEFAULT_TIER_LABEL.to_string())),
    }
}
