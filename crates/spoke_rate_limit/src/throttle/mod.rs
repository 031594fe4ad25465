//! Classify outgoing requests by route and serialize each class behind a delay.

mod class;
mod classifier;
mod future;
pub mod layer;
mod pattern;
mod scheduler;
pub mod service;
mod settings;

pub mod http;
pub mod internal_event;
pub mod reqwest_integration;

use std::{future::Future, sync::Arc};

use ::http::Method;
use tokio::time::Instant;

pub use class::RateClass;
pub use classifier::{Classifier, Rule, SPOKE_BASE_PATH};
pub use future::ResponseFuture;
pub use layer::RateLimitLayer;
pub use pattern::PathTemplate;
pub use scheduler::{MAX_DELAY, Scheduler};
pub use service::RateLimit;
pub use settings::DelaySettings;

/// The pipeline hook run once per outgoing request.
///
/// Pairs a [`Classifier`] with a shared [`Scheduler`]. Cloning is cheap and
/// every clone feeds the same lanes, so one `Throttle` can sit in front of any
/// number of concurrent callers.
///
/// The hook only delays. It never touches the request itself.
///
/// ```rust
/// use http::Method;
/// use spoke_rate_limit::throttle::Throttle;
///
/// # async fn run() {
/// let throttle = Throttle::default();
/// throttle
///     .on_outgoing_request(&Method::GET, "/public/v0.2b/plans")
///     .await;
/// // ... send the request
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Throttle {
    classifier: Arc<Classifier>,
    scheduler: Arc<Scheduler>,
}

impl Throttle {
    /// Spoke routes under the default base path, with a fresh scheduler.
    pub fn new(settings: DelaySettings) -> Self {
        Self::from_parts(Classifier::default(), Arc::new(Scheduler::new(settings)))
    }

    /// Lets several throttles share one scheduler, or use another base path.
    pub fn from_parts(classifier: Classifier, scheduler: Arc<Scheduler>) -> Self {
        Self {
            classifier: Arc::new(classifier),
            scheduler,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Classifies the request and takes its slot. `None` means send now.
    pub fn reserve(&self, method: &Method, path: &str) -> (RateClass, Option<Instant>) {
        let class = self.classifier.classify(method, path);
        (class, self.scheduler.reserve(class))
    }

    /// Resolves once the request may be sent.
    ///
    /// The slot is taken immediately; awaiting only waits for it.
    pub fn on_outgoing_request(
        &self,
        method: &Method,
        path: &str,
    ) -> impl Future<Output = ()> + Send + 'static {
        let class = self.classifier.classify(method, path);
        trace!(%method, path, %class, "Classified outgoing request.");
        self.scheduler.schedule(class)
    }
}
