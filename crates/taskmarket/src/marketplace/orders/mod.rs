//! Order lifecycle: applications, proof submission, admin review, payout, and cancellation.

pub mod router;
pub mod service;
pub(crate) mod transitions;

pub use router::{actor_from_headers, error_response, marketplace_router};
pub use service::{LifecyclePolicy, OrderLifecycleService};
