//! Future types

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project::pin_project;
use tokio::time::{Instant, Sleep, sleep_until};
use tower::Service;

use super::{
    RateClass,
    internal_event::{InternalEvent, RequestGranted},
};

/// Future for the [`RateLimit`](super::RateLimit) service.
///
/// Holds the request until its slot is granted, then calls the inner service
/// and resolves to whatever it returns. Exactly one of `pending` and `future`
/// is set at any time.
#[pin_project]
pub struct ResponseFuture<S, Request>
where
    S: Service<Request>,
{
    class: RateClass,
    #[pin]
    sleep: Option<Sleep>,
    pending: Option<(S, Request)>,
    #[pin]
    future: Option<S::Future>,
}

impl<S, Request> ResponseFuture<S, Request>
where
    S: Service<Request>,
{
    /// `service` must already be ready.
    pub(crate) fn waiting(deadline: Instant, class: RateClass, service: S, request: Request) -> Self {
        Self {
            class,
            sleep: Some(sleep_until(deadline)),
            pending: Some((service, request)),
            future: None,
        }
    }

    pub(crate) fn called(class: RateClass, future: S::Future) -> Self {
        Self {
            class,
            sleep: None,
            pending: None,
            future: Some(future),
        }
    }
}

impl<S, Request> Future for ResponseFuture<S, Request>
where
    S: Service<Request>,
{
    type Output = Result<S::Response, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if let Some((mut service, request)) = this.pending.take() {
            if let Some(sleep) = this.sleep.as_mut().as_pin_mut() {
                if sleep.poll(cx).is_pending() {
                    *this.pending = Some((service, request));
                    return Poll::Pending;
                }
            }
            RequestGranted { class: *this.class }.emit();
            this.sleep.set(None);
            this.future.set(Some(service.call(request)));
        }

        match this.future.as_pin_mut() {
            Some(future) => future.poll(cx),
            None => Poll::Pending,
        }
    }
}
