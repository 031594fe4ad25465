//! Spoke REST API access with per-route request throttling.
//!
//! Most users want [`SpokeClient`]. The throttle itself lives in
//! [`rate_limit`] for callers who bring their own tower stack.

pub use spoke_client::{
    DEFAULT_BASE_URL, SpokeClient, SpokeClientConfig, SpokeClientError,
};
pub use spoke_rate_limit as rate_limit;
pub use spoke_rate_limit::throttle::{DelaySettings, RateClass, RateLimitLayer, Throttle};
