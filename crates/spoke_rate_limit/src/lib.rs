//! Per-route request throttling for the Spoke REST API.
//!
//! The Spoke API enforces different rate limits on different endpoints. This
//! crate sits in front of the HTTP transport, sorts every outgoing request into
//! a [`RateClass`](throttle::RateClass) by method and route, and queues requests
//! of the same class behind a minimum delay. Requests are never dropped or
//! reordered; callers simply wait for their turn.
//!
//! # How it works
//!
//! 1. **Classify**: an ordered rule table maps `(method, path)` to the first
//!    matching class. Route templates understand parameters (`:planId`) and
//!    colon verb suffixes (`stops:import`, `:planId:optimize`).
//! 2. **Schedule**: each class has its own lane holding the time of its last
//!    grant. A new request is granted at `max(last grant, now) + delay`.
//!    Unclassified requests skip the queue entirely.
//!
//! | Class | Route | Default delay |
//! |-------|-------|---------------|
//! | `DriverCreation` | `POST /drivers` | 1 s |
//! | `BatchImportStops` | `POST /plans/:planId/stops:import`, `POST /unassignedStops:import` | 6 s |
//! | `BatchImportDrivers` | `POST /drivers:import` | 30 s |
//! | `PlanOptimization` | `POST /plans/:planId:optimize`, `POST /plans/:planId:reoptimize` | 20 s |
//! | `Write` | any other `POST`, `PATCH`, `DELETE` | 200 ms |
//! | `Read` | any other `GET` | 100 ms |
//!
//! # Concurrency
//! - Lanes are independent; each is guarded by its own mutex held only for
//!   the reservation arithmetic, never across an await
//! - Works on current-thread and multi-thread tokio runtimes
//! - No unsafe code
//!
//! # Basic Usage
//! ```
//! use spoke_rate_limit::throttle::{DelaySettings, RateLimitLayer};
//! use spoke_rate_limit::throttle::reqwest_integration::ReqwestService;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(RateLimitLayer::new(DelaySettings::default()))
//!     .service(ReqwestService::new());
//! // Call `service` with `http::Request<Option<Bytes>>` as usual
//! ```
//!
//! # Configuration
//! See [`throttle::DelaySettings`] for the per-class delays.
//!
//! # Metrics
//! Emits metrics and log lines via the [`InternalEvent`](throttle::internal_event::InternalEvent) trait
pub mod throttle;
#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
