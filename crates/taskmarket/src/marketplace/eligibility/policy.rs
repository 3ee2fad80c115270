use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::domain::{KycStatus, OrderId};

/// User-facing reasons an application is refused, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    NotPublished,
    Frozen,
    Ended {
        ended_at: DateTime<Utc>,
    },
    SlotsFull,
    KycRequired {
        status: KycStatus,
    },
    InsufficientDeposit {
        required: Decimal,
        current: Decimal,
    },
    ActiveOrderExists {
        order_id: OrderId,
    },
    AlreadyCompleted {
        order_id: OrderId,
    },
    UnknownTier {
        index: usize,
        available: usize,
    },
}

impl DenialReason {
    pub fn summary(&self) -> String {
        match self {
            DenialReason::NotPublished => "job is not published yet".to_string(),
            DenialReason::Frozen => "job is frozen".to_string(),
            DenialReason::Ended { ended_at } => {
                format!("job ended at {}", ended_at.format("%Y-%m-%d %H:%M UTC"))
            }
            DenialReason::SlotsFull => "slots full".to_string(),
            DenialReason::KycRequired { status } => format!(
                "identity verification required (current status: {})",
                status.label()
            ),
            DenialReason::InsufficientDeposit { required, current } => format!(
                "deposit of {required} required, current deposit is {current}"
            ),
            DenialReason::ActiveOrderExists { order_id } => {
                format!("an active order already exists for this job ({order_id})")
            }
            DenialReason::AlreadyCompleted { order_id } => {
                format!("job already completed ({order_id}) and is not repeatable")
            }
            DenialReason::UnknownTier { index, available } => format!(
                "tier {index} does not exist (job offers {available} tier(s))"
            ),
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
