use tower::Layer;

use super::{DelaySettings, RateLimit, Throttle};

/// Delays requests per rate class before they reach the wrapped service.
///
/// Every service produced by one layer shares the same scheduler, so clones
/// handed to concurrent tasks are throttled together.
#[derive(Clone, Debug, Default)]
pub struct RateLimitLayer {
    throttle: Throttle,
}

impl RateLimitLayer {
    pub fn new(settings: DelaySettings) -> Self {
        Self::from_throttle(Throttle::new(settings))
    }

    pub fn from_throttle(throttle: Throttle) -> Self {
        Self { throttle }
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimit::new(service, self.throttle.clone())
    }
}
