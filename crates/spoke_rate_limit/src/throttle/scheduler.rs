use std::{
    cmp,
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::{Instant, sleep_until};

use super::{
    DelaySettings, RateClass,
    internal_event::{InternalEvent, RequestGranted, RequestPassedThrough, RequestQueued},
};

/// Longest delay a lane applies; larger configured delays are capped to it.
pub const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// One class's queue: the grant time of the most recently scheduled request.
#[derive(Debug)]
struct Lane {
    delay: Duration,
    tail: Mutex<Instant>,
}

impl Lane {
    fn new(delay: Duration, created: Instant) -> Self {
        Self {
            delay: cmp::min(delay, MAX_DELAY),
            tail: Mutex::new(created),
        }
    }

    /// Takes the next slot. Returns the grant instant and the time it was taken.
    fn reserve(&self) -> (Instant, Instant) {
        // The guarded value is a plain instant, always valid even if a holder panicked.
        let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let base = cmp::max(*tail, now);
        // Saturates rather than panicking once the tail nears the end of time.
        let grant = base.checked_add(self.delay).unwrap_or(base);
        *tail = grant;
        (grant, now)
    }
}

/// Serializes requests per [`RateClass`] behind a minimum delay.
///
/// Each throttled class owns an independent lane holding the grant time of
/// the last request scheduled on it. Scheduling takes the lane lock just long
/// enough to compute `max(tail, now) + delay`, stores that as the new tail and
/// hands it to the caller, who then sleeps until it. So within a class:
///
/// - grants are issued in the order `schedule` was called;
/// - consecutive grants are at least the class delay apart, however long the
///   requests themselves take;
/// - the first request on a lane also waits the full delay, since the lane
///   starts out as if a request had just been granted at construction.
///
/// Lanes never wait on each other. Dropping a pending wait does not give its
/// slot back: later callers are still spaced after it.
///
/// The scheduler is an ordinary value. Share it with [`std::sync::Arc`] to
/// throttle several clients together, or build one per API key.
#[derive(Debug)]
pub struct Scheduler {
    settings: DelaySettings,
    lanes: [Lane; 6],
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DelaySettings::default())
    }
}

impl Scheduler {
    pub fn new(settings: DelaySettings) -> Self {
        let created = Instant::now();
        let lanes = RateClass::THROTTLED
            .map(|class| Lane::new(settings.delay_for(class).unwrap_or_default(), created));

        Self { settings, lanes }
    }

    pub fn settings(&self) -> &DelaySettings {
        &self.settings
    }

    /// Takes the next slot for `class` and returns when it is granted.
    ///
    /// Returns `None` for [`RateClass::Unclassified`], which is never queued.
    /// The slot stays taken whether or not the caller ends up waiting for it.
    pub fn reserve(&self, class: RateClass) -> Option<Instant> {
        let Some(lane) = class.lane().map(|index| &self.lanes[index]) else {
            RequestPassedThrough.emit();
            return None;
        };

        let (grant, now) = lane.reserve();
        RequestQueued {
            class,
            queued_for: grant.saturating_duration_since(now),
        }
        .emit();

        Some(grant)
    }

    /// Waits for this request's turn in `class`.
    ///
    /// The slot is taken when this is called, not when the returned future is
    /// first polled, so the call order is the grant order. The future does not
    /// borrow the scheduler.
    pub fn schedule(&self, class: RateClass) -> impl Future<Output = ()> + Send + 'static {
        let grant = self.reserve(class);
        async move {
            if let Some(grant) = grant {
                wait_until(grant).await;
                RequestGranted { class }.emit();
            }
        }
    }
}

/// Sleeps until `deadline`, skipping the timer when it has already passed.
pub(crate) async fn wait_until(deadline: Instant) {
    if deadline > Instant::now() {
        sleep_until(deadline).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time;

    use super::*;
    use crate::test_utils::trace_init;

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "expected {expected:?}, got {elapsed:?}"
        );
    }

    fn settings_with(class: RateClass, delay: Duration) -> DelaySettings {
        let builder = DelaySettings::builder();
        match class {
            RateClass::DriverCreation => builder.driver_creation_delay(delay).build(),
            RateClass::BatchImportStops => builder.batch_import_stops_delay(delay).build(),
            RateClass::BatchImportDrivers => builder.batch_import_drivers_delay(delay).build(),
            RateClass::PlanOptimization => builder.plan_optimization_delay(delay).build(),
            RateClass::Write => builder.write_request_delay(delay).build(),
            RateClass::Read => builder.read_request_delay(delay).build(),
            RateClass::Unclassified => builder.build(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_pays_full_delay() {
        trace_init();

        let scheduler = Scheduler::default();
        for class in RateClass::THROTTLED {
            let start = Instant::now();
            scheduler.schedule(class).await;
            let delay = scheduler.settings().delay_for(class).unwrap();
            assert!(start.elapsed() >= delay, "{class} returned early");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_calls_are_spaced_by_delay() {
        let scheduler = Scheduler::new(settings_with(
            RateClass::DriverCreation,
            Duration::from_millis(50),
        ));

        scheduler.schedule(RateClass::DriverCreation).await;
        let first = Instant::now();
        scheduler.schedule(RateClass::DriverCreation).await;
        let gap = first.elapsed();

        assert!(gap >= Duration::from_millis(45), "gap {gap:?}");
        assert!(gap < Duration::from_millis(100), "gap {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn unclassified_is_never_delayed() {
        let scheduler = Scheduler::default();
        // A busy lane elsewhere must not matter.
        let _queued = scheduler.schedule(RateClass::BatchImportDrivers);

        let start = Instant::now();
        assert_eq!(scheduler.reserve(RateClass::Unclassified), None);
        scheduler.schedule(RateClass::Unclassified).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn classes_do_not_wait_on_each_other() {
        let scheduler = Arc::new(Scheduler::default());
        let start = Instant::now();

        let slow: Vec<_> = (0..5)
            .map(|_| tokio::spawn(scheduler.schedule(RateClass::BatchImportDrivers)))
            .collect();

        scheduler.schedule(RateClass::Read).await;
        assert_elapsed(start, Duration::from_millis(100));

        for handle in slow {
            handle.await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_secs(5 * 30));
    }

    #[tokio::test(start_paused = true)]
    async fn default_batch_import_throughput() {
        let scheduler = Scheduler::default();
        let mut grants = Vec::new();

        for _ in 0..10 {
            scheduler.schedule(RateClass::BatchImportStops).await;
            grants.push(Instant::now());
        }

        let span = grants[9] - grants[0];
        assert!(span >= Duration::from_millis(9 * 6_000), "span {span:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_granted_in_call_order() {
        let scheduler = Scheduler::new(settings_with(RateClass::Write, Duration::from_millis(200)));
        let start = Instant::now();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|index| {
                let wait = scheduler.schedule(RateClass::Write);
                let order = Arc::clone(&order);
                tokio::spawn(async move {
                    wait.await;
                    order.lock().unwrap().push((index, start.elapsed()));
                })
            })
            .collect();

        for handle in handles.into_iter().rev() {
            handle.await.unwrap();
        }

        let order = order.lock().unwrap();
        let indices: Vec<_> = order.iter().map(|(index, _)| *index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        for (index, elapsed) in order.iter() {
            assert!(*elapsed >= Duration::from_millis(200 * (*index as u64 + 1)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_wait_keeps_its_slot() {
        let scheduler = Scheduler::new(settings_with(RateClass::Write, Duration::from_millis(200)));
        let start = Instant::now();

        drop(scheduler.schedule(RateClass::Write));
        scheduler.schedule(RateClass::Write).await;

        assert_elapsed(start, Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_lane_restarts_from_now() {
        let scheduler = Scheduler::new(settings_with(RateClass::Read, Duration::from_millis(100)));

        scheduler.schedule(RateClass::Read).await;
        time::advance(Duration::from_secs(10)).await;

        let start = Instant::now();
        scheduler.schedule(RateClass::Read).await;
        assert_elapsed(start, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_proceeds_immediately() {
        let scheduler = Scheduler::new(settings_with(RateClass::Read, Duration::ZERO));
        let start = Instant::now();

        for _ in 0..3 {
            scheduler.schedule(RateClass::Read).await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_delays_are_capped_and_never_overflow() {
        let settings: DelaySettings =
            serde_json::from_str(&format!(r#"{{"read_request_delay_ms": {}}}"#, i64::MAX)).unwrap();
        let scheduler = Scheduler::new(settings);
        let start = Instant::now();

        let mut previous = start;
        for _ in 0..2_000 {
            let grant = scheduler.reserve(RateClass::Read).unwrap();
            assert!(grant >= previous);
            previous = grant;
        }

        let first = Scheduler::new(settings_with(RateClass::Write, Duration::MAX))
            .reserve(RateClass::Write)
            .unwrap();
        assert_eq!(first - start, MAX_DELAY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reservations_stay_serialized_across_threads() {
        let delay = Duration::from_millis(3);
        let scheduler = Arc::new(Scheduler::new(settings_with(RateClass::Write, delay)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    (0..25)
                        .map(|_| scheduler.reserve(RateClass::Write).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut grants = Vec::new();
        for handle in handles {
            grants.extend(handle.await.unwrap());
        }
        grants.sort();

        assert_eq!(grants.len(), 200);
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= delay, "grants {:?} apart", pair[1] - pair[0]);
        }
    }
}
