//! Job application, order lifecycle, and balance ledger engine for a task marketplace.
//!
//! The [`marketplace`] module holds the domain: the job catalog, the eligibility evaluator, the
//! order lifecycle service, the balance ledger, and the scheduled sweeper. Storage and
//! notification delivery sit behind traits so the HTTP service and tests can plug in their own
//! adapters.

pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;
