use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{Account, AccountId, Actor, KycStatus};
use super::error::MarketError;
use super::locks::KeyedLocks;
use super::repository::{AccountStore, RepositoryError};

const DEFAULT_CREDIT_SCORE: u8 = 100;

/// Account store facade. Every mutation of an account runs under that account's lock, which the
/// balance ledger shares so balance, credit, and status writes never interleave.
pub struct AccountRegistry {
    store: Arc<dyn AccountStore>,
    locks: KeyedLocks<AccountId>,
    default_credit_score: u8,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
            default_credit_score: DEFAULT_CREDIT_SCORE,
        }
    }

    pub fn with_default_credit_score(mut self, score: u8) -> Self {
        self.default_credit_score = score.min(100);
        self
    }

    pub fn register(
        &self,
        id: AccountId,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Account, MarketError> {
        let account = Account::new(id, display_name, self.default_credit_score, now);
        match self.store.insert(account) {
            Ok(stored) => {
                info!(account_id = %stored.id, "account registered");
                Ok(stored)
            }
            Err(RepositoryError::Conflict) => Err(MarketError::BadRequest(
                "account already exists".to_string(),
            )),
            Err(other) => Err(other.into()),
        }
    }

    pub fn get(&self, id: &AccountId) -> Result<Account, MarketError> {
        self.store
            .fetch(id)?
            .ok_or_else(|| MarketError::missing("account", id))
    }

    /// Move an account into KYC review. Rejected accounts may resubmit.
    pub fn submit_kyc(&self, actor: &Actor, id: &AccountId) -> Result<Account, MarketError> {
        if !actor.is_admin() && !actor.owns(id) {
            return Err(MarketError::Forbidden(
                "only the account owner may submit identity documents".to_string(),
            ));
        }

        self.modify(id, |account| match account.kyc_status {
            KycStatus::Unverified | KycStatus::Rejected => {
                account.kyc_status = KycStatus::Pending;
                Ok(())
            }
            other => Err(MarketError::BadRequest(format!(
                "identity verification is already {}",
                other.label()
            ))),
        })
    }

    pub fn review_kyc(
        &self,
        actor: &Actor,
        id: &AccountId,
        approve: bool,
    ) -> Result<Account, MarketError> {
        require_admin(actor, "review identity verification")?;

        let account = self.modify(id, |account| {
            if account.kyc_status != KycStatus::Pending {
                return Err(MarketError::BadRequest(format!(
                    "identity verification is {}, not pending",
                    account.kyc_status.label()
                )));
            }
            account.kyc_status = if approve {
                KycStatus::Verified
            } else {
                KycStatus::Rejected
            };
            Ok(())
        })?;

        info!(account_id = %id, status = account.kyc_status.label(), "kyc reviewed");
        Ok(account)
    }

    pub fn set_active(
        &self,
        actor: &Actor,
        id: &AccountId,
        active: bool,
    ) -> Result<Account, MarketError> {
        require_admin(actor, "change account activation")?;
        let account = self.modify(id, |account| {
            account.is_active = active;
            Ok(())
        })?;
        info!(account_id = %id, active, "account activation changed");
        Ok(account)
    }

    /// Fetch, mutate, and write back one account under its lock.
    pub(crate) fn modify(
        &self,
        id: &AccountId,
        f: impl FnOnce(&mut Account) -> Result<(), MarketError>,
    ) -> Result<Account, MarketError> {
        self.locked(id, || {
            let mut account = self.get(id)?;
            f(&mut account)?;
            self.store.update(account.clone())?;
            Ok(account)
        })
    }

    pub(crate) fn locked<T>(
        &self,
        id: &AccountId,
        f: impl FnOnce() -> Result<T, MarketError>,
    ) -> Result<T, MarketError> {
        self.locks.with(id, f)
    }

    pub(crate) fn store(&self) -> &dyn AccountStore {
        self.store.as_ref()
    }
}

pub(crate) fn require_admin(actor: &Actor, action: &str) -> Result<(), MarketError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(MarketError::Forbidden(format!(
            "administrator role required to {action}"
        )))
    }
}
