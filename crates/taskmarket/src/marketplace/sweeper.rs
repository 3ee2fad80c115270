//! Periodic pass that publishes scheduled jobs, freezes expired ones, and expires overdue orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::catalog::evaluate_publication_window;
use super::domain::{JobId, OrderId};
use super::error::MarketError;
use super::orders::OrderLifecycleService;
use super::repository::JobCatalog;

/// Upper bound on `Applied` orders inspected for expiry in a single pass.
pub const EXPIRY_BATCH: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub published: Vec<JobId>,
    pub frozen: Vec<JobId>,
    pub expired_orders: Vec<OrderId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.published.is_empty() && self.frozen.is_empty() && self.expired_orders.is_empty()
    }
}

pub struct Sweeper {
    catalog: Arc<dyn JobCatalog>,
    lifecycle: Arc<OrderLifecycleService>,
}

impl Sweeper {
    pub fn new(catalog: Arc<dyn JobCatalog>, lifecycle: Arc<OrderLifecycleService>) -> Self {
        Self { catalog, lifecycle }
    }

    /// Run one pass at `now`. A job that fails to update is logged and skipped; the rest of the
    /// batch still runs.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, MarketError> {
        let mut report = SweepReport::default();

        for job in self.catalog.list()? {
            let change = evaluate_publication_window(&job, now);
            if change.is_empty() {
                continue;
            }

            match self.catalog.raise_flags(&job.id, change) {
                Ok(Some(_)) => {
                    if change.publish {
                        report.published.push(job.id.clone());
                    }
                    if change.freeze {
                        report.frozen.push(job.id.clone());
                    }
                }
                Ok(None) => debug!(job_id = %job.id, "job removed before sweep could update it"),
                Err(sweep_error) => {
                    warn!(job_id = %job.id, %sweep_error, "failed to update publication flags")
                }
            }
        }

        report.expired_orders = self
            .lifecycle
            .expire_overdue(now, EXPIRY_BATCH)?
            .into_iter()
            .map(|order| order.id)
            .collect();

        if report.is_empty() {
            debug!("sweep found nothing to change");
        } else {
            info!(
                published = report.published.len(),
                frozen = report.frozen.len(),
                expired_orders = report.expired_orders.len(),
                "sweep completed"
            );
        }
        Ok(report)
    }

    /// Run `sweep` every `period` on the tokio runtime until the handle is aborted. `on_change`
    /// sees every report that changed something.
    pub fn spawn<F>(self: Arc<Self>, period: Duration, on_change: F) -> JoinHandle<()>
    where
        F: Fn(&SweepReport) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.sweep(Utc::now()) {
                    Ok(report) if !report.is_empty() => on_change(&report),
                    Ok(_) => {}
                    Err(sweep_error) => error!(%sweep_error, "scheduled sweep failed"),
                }
            }
        })
    }
}
