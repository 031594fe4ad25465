use std::time::Duration;

use metrics::{counter, histogram};

use super::RateClass;

/// An observable event, reported as metrics and a log line.
pub trait InternalEvent {
    fn emit(self);
}

/// A request took a slot in its class lane.
#[derive(Clone, Copy, Debug)]
pub struct RequestQueued {
    pub class: RateClass,
    /// Time until the slot is granted, measured at reservation.
    pub queued_for: Duration,
}

impl InternalEvent for RequestQueued {
    fn emit(self) {
        histogram!("spoke_rate_limit_queued_seconds", "class" => self.class.as_str())
            .record(self.queued_for);
        counter!("spoke_rate_limit_requests_total", "class" => self.class.as_str()).increment(1);

        debug!(
            target: "spoke_rate_limit::stats",
            class = %self.class,
            queued_ms = self.queued_for.as_millis(),
            "Request queued."
        );
    }
}

/// A request matched no throttled class and went straight through.
#[derive(Clone, Copy, Debug)]
pub struct RequestPassedThrough;

impl InternalEvent for RequestPassedThrough {
    fn emit(self) {
        counter!("spoke_rate_limit_requests_total", "class" => RateClass::Unclassified.as_str())
            .increment(1);
        trace!(target: "spoke_rate_limit::stats", "Request passed through unthrottled.");
    }
}

/// A queued request reached its grant time.
#[derive(Clone, Copy, Debug)]
pub struct RequestGranted {
    pub class: RateClass,
}

impl InternalEvent for RequestGranted {
    fn emit(self) {
        trace!(target: "spoke_rate_limit::stats", class = %self.class, "Request granted.");
    }
}
