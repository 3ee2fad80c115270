use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::domain::Account;

pub const MAX_CREDIT_SCORE: u8 = 100;
pub const COMPLETION_CREDIT_BONUS: i32 = 1;
pub const COMPLETION_EXPERIENCE_BONUS: u64 = 2;
pub const OWNER_CANCEL_PENALTY: i32 = 1;

/// Outcome of a credit score mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditChange {
    pub previous: u8,
    pub current: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_hours: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_until: Option<DateTime<Utc>>,
}

pub fn clamp_credit(score: i32) -> u8 {
    score.clamp(0, i32::from(MAX_CREDIT_SCORE)) as u8
}

/// Experience for completing an order: a flat bonus plus the whole part of the payout.
pub fn completion_experience(amount: Decimal) -> u64 {
    let proportional = amount.trunc().to_u64().unwrap_or(0);
    COMPLETION_EXPERIENCE_BONUS.saturating_add(proportional)
}

/// Ban length for a freshly lowered score. The most severe threshold crossed wins.
pub fn ban_duration(score: u8) -> Option<Duration> {
    match score {
        0 => Some(Duration::hours(8760)),
        1..=19 => Some(Duration::hours(720)),
        20..=39 => Some(Duration::hours(72)),
        40..=59 => Some(Duration::hours(24)),
        _ => None,
    }
}

/// Bans stack: the new period starts when the current one ends, or now if none is running.
pub fn extend_ban(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration: Duration,
) -> DateTime<Utc> {
    let start = current.map_or(now, |until| until.max(now));
    start + duration
}

/// Apply `delta` to the account's credit score, clamping to `[0, 100]` and, when the score
/// actually drops, stacking the ban matching the new score.
pub fn apply_credit_delta(account: &mut Account, delta: i32, now: DateTime<Utc>) -> CreditChange {
    let previous = account.credit_score;
    let current = clamp_credit(i32::from(previous) + delta);
    account.credit_score = current;

    let mut change = CreditChange {
        previous,
        current,
        ban_hours: None,
        ban_until: None,
    };

    if current < previous {
        if let Some(duration) = ban_duration(current) {
            let until = extend_ban(account.credit_ban_until, now, duration);
            account.credit_ban_until = Some(until);
            change.ban_hours = Some(duration.num_hours());
            change.ban_until = Some(until);
        }
    }

    change
}
