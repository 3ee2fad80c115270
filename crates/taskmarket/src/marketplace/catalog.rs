//! Job catalog administration and the publication window rule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::accounts::require_admin;
use super::domain::{Actor, AmountLevel, Job, JobId};
use super::error::MarketError;
use super::locks::KeyedLocks;
use super::repository::{JobCatalog, OrderRepository, RepositoryError};

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> JobId {
    let id = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    JobId(format!("job-{id:06}"))
}

/// Admin-supplied job definition used for both creation and edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub total_slots: u32,
    pub amount: Decimal,
    #[serde(default)]
    pub amount_levels: Vec<AmountLevel>,
    /// Publish immediately instead of waiting for `scheduled_at`.
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_limited_time: bool,
    #[serde(default)]
    pub auto_freeze: bool,
    #[serde(default)]
    pub is_repeatable: bool,
    #[serde(default)]
    pub deposit_requirement: Decimal,
    #[serde(default)]
    pub kyc_required: bool,
}

/// Flags the publication window wants raised. Flags only ever move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationChange {
    pub publish: bool,
    pub freeze: bool,
}

impl PublicationChange {
    pub fn is_empty(&self) -> bool {
        !self.publish && !self.freeze
    }
}

/// Decide which flags a job's schedule calls for at `now`. Pure; callers persist the result.
pub fn evaluate_publication_window(job: &Job, now: DateTime<Utc>) -> PublicationChange {
    let publish = !job.is_published && job.scheduled_at.is_some_and(|at| at <= now);

    let expired = job.end_at.is_some_and(|end| end < now)
        || job.deadline.is_some_and(|deadline| deadline < now);
    let freeze = job.auto_freeze && !job.is_frozen && expired;

    PublicationChange { publish, freeze }
}

/// Admin operations over the job catalog.
pub struct JobBoard {
    catalog: Arc<dyn JobCatalog>,
    orders: Arc<dyn OrderRepository>,
    job_locks: Arc<KeyedLocks<JobId>>,
}

impl JobBoard {
    pub fn new(catalog: Arc<dyn JobCatalog>, orders: Arc<dyn OrderRepository>) -> Self {
        Self {
            catalog,
            orders,
            job_locks: Arc::new(KeyedLocks::default()),
        }
    }

    /// Use the lifecycle engine's per-job locks so deletion and applications never interleave.
    pub(crate) fn sharing_job_locks(mut self, job_locks: Arc<KeyedLocks<JobId>>) -> Self {
        self.job_locks = job_locks;
        self
    }

    pub fn create(
        &self,
        actor: &Actor,
        draft: JobDraft,
        now: DateTime<Utc>,
    ) -> Result<Job, MarketError> {
        require_admin(actor, "create jobs")?;
        validate_draft(&draft)?;

        let publish = draft.publish;
        let mut job = job_from_draft(next_job_id(), draft, now);
        job.is_published = publish;

        let change = evaluate_publication_window(&job, now);
        job.is_published |= change.publish;
        job.is_frozen |= change.freeze;

        let stored = self.catalog.insert(job)?;
        info!(
            job_id = %stored.id,
            slots = stored.total_slots,
            published = stored.is_published,
            "job created"
        );
        Ok(stored)
    }

    /// Replace a job's editable fields. Slot counters and publication flags are untouched.
    pub fn update(
        &self,
        actor: &Actor,
        id: &JobId,
        draft: JobDraft,
    ) -> Result<Job, MarketError> {
        require_admin(actor, "edit jobs")?;
        validate_draft(&draft)?;

        let existing = self.get(id)?;
        let job = job_from_draft(id.clone(), draft, existing.created_at);

        match self.catalog.update_details(job) {
            Ok(updated) => {
                info!(job_id = %id, "job updated");
                Ok(updated)
            }
            Err(RepositoryError::Conflict) => Err(MarketError::BadRequest(format!(
                "total slots cannot drop below the {} slot(s) already taken",
                existing.applied_count
            ))),
            Err(RepositoryError::NotFound) => Err(MarketError::missing("job", id)),
            Err(other) => Err(other.into()),
        }
    }

    /// Delete a job that no order references. Runs under the job's lock so no application can
    /// land between the reference count and the removal.
    pub fn delete(&self, actor: &Actor, id: &JobId) -> Result<Job, MarketError> {
        require_admin(actor, "delete jobs")?;

        let removed = self.job_locks.with(id, || -> Result<Job, MarketError> {
            self.get(id)?;

            let references = self.orders.count_for_job(id)?;
            if references > 0 {
                return Err(MarketError::BadRequest(format!(
                    "job {id} is referenced by {references} order(s) and cannot be deleted"
                )));
            }

            Ok(self.catalog.remove(id)?)
        })?;

        info!(job_id = %id, "job deleted");
        Ok(removed)
    }

    pub fn get(&self, id: &JobId) -> Result<Job, MarketError> {
        self.catalog
            .fetch(id)?
            .ok_or_else(|| MarketError::missing("job", id))
    }

    /// Published, unfrozen jobs, newest first.
    pub fn list_open(&self) -> Result<Vec<Job>, MarketError> {
        let mut jobs: Vec<Job> = self
            .catalog
            .list()?
            .into_iter()
            .filter(|job| job.is_published && !job.is_frozen)
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    pub fn list_all(&self, actor: &Actor) -> Result<Vec<Job>, MarketError> {
        require_admin(actor, "list unpublished jobs")?;
        let mut jobs = self.catalog.list()?;
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }
}

fn job_from_draft(id: JobId, draft: JobDraft, created_at: DateTime<Utc>) -> Job {
    Job {
        id,
        title: draft.title.trim().to_string(),
        description: draft.description,
        categories: draft.categories,
        total_slots: draft.total_slots,
        applied_count: 0,
        amount: draft.amount,
        amount_levels: draft.amount_levels,
        is_frozen: false,
        is_published: false,
        scheduled_at: draft.scheduled_at,
        end_at: draft.end_at,
        deadline: draft.deadline,
        is_limited_time: draft.is_limited_time,
        auto_freeze: draft.auto_freeze,
        is_repeatable: draft.is_repeatable,
        deposit_requirement: draft.deposit_requirement,
        kyc_required: draft.kyc_required,
        created_at,
    }
}

fn validate_draft(draft: &JobDraft) -> Result<(), MarketError> {
    if draft.title.trim().is_empty() {
        return Err(MarketError::BadRequest("job title is required".to_string()));
    }
    if draft.total_slots == 0 {
        return Err(MarketError::BadRequest(
            "total slots must be at least 1".to_string(),
        ));
    }
    if draft.amount <= Decimal::ZERO {
        return Err(MarketError::BadRequest(
            "job amount must be positive".to_string(),
        ));
    }
    if let Some(level) = draft
        .amount_levels
        .iter()
        .find(|level| level.label.trim().is_empty() || level.amount <= Decimal::ZERO)
    {
        return Err(MarketError::BadRequest(format!(
            "amount level '{}' needs a label and a positive amount",
            level.label
        )));
    }
    if draft.deposit_requirement < Decimal::ZERO {
        return Err(MarketError::BadRequest(
            "deposit requirement cannot be negative".to_string(),
        ));
    }
    if let (Some(start), Some(end)) = (draft.scheduled_at, draft.end_at) {
        if end < start {
            return Err(MarketError::BadRequest(
                "end time must not precede the scheduled publication".to_string(),
            ));
        }
    }
    Ok(())
}
