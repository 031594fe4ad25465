use std::{
    mem,
    task::{Context, Poll},
};

use tokio::time::Instant;
use tower::Service;

use super::{ResponseFuture, Throttle};

/// Holds each request until its rate class allows it, then forwards it
/// unchanged.
///
/// The slot is taken in [`Service::call`], so requests are granted in the
/// order they were handed to the service. Responses and errors from the inner
/// service are returned untouched.
#[derive(Clone, Debug)]
pub struct RateLimit<S> {
    inner: S,
    throttle: Throttle,
}

impl<S> RateLimit<S> {
    pub fn new(inner: S, throttle: Throttle) -> Self {
        Self { inner, throttle }
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B> Service<http::Request<B>> for RateLimit<S>
where
    S: Service<http::Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S, http::Request<B>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let (class, grant) = self
            .throttle
            .reserve(request.method(), request.uri().path());

        match grant {
            Some(deadline) if deadline > Instant::now() => {
                // The ready service goes with the request; keep a fresh clone for the next call.
                let clone = self.inner.clone();
                let inner = mem::replace(&mut self.inner, clone);
                ResponseFuture::waiting(deadline, class, inner, request)
            }
            _ => ResponseFuture::called(class, self.inner.call(request)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{Method, Request};
    use tokio::time;
    use tokio_test::{assert_pending, assert_ready_err, assert_ready_ok, task};
    use tower::{Layer, ServiceExt};
    use tower_test::mock;

    use super::*;
    use crate::test_utils::trace_init;
    use crate::throttle::{DelaySettings, RateLimitLayer};

    const BASE: &str = "https://api.getcircuit.com/public/v0.2b";

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder()
            .method(method)
            .uri(format!("{BASE}{path}"))
            .body(())
            .unwrap()
    }

    fn layer() -> RateLimitLayer {
        RateLimitLayer::new(
            DelaySettings::builder()
                .driver_creation_delay(Duration::from_millis(50))
                .build(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn holds_classified_request_until_granted() {
        trace_init();

        let (mut service, mut handle) = mock::spawn_layer::<Request<()>, &'static str, _>(layer());

        assert_ready_ok!(service.poll_ready());
        let mut response = task::spawn(service.call(request(Method::POST, "/drivers")));

        assert_pending!(response.poll());
        assert_pending!(handle.poll_request());

        time::advance(Duration::from_millis(50)).await;
        assert_pending!(response.poll());

        let (received, send) = handle.next_request().await.unwrap();
        assert_eq!(received.method(), Method::POST);
        assert_eq!(received.uri().path(), "/public/v0.2b/drivers");

        send.send_response("created");
        assert_eq!(assert_ready_ok!(response.poll()), "created");
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_polls_send_the_request_once() {
        let (mut service, mut handle) = mock::spawn_layer::<Request<()>, &'static str, _>(layer());

        assert_ready_ok!(service.poll_ready());
        let mut response = task::spawn(service.call(request(Method::POST, "/drivers")));

        for _ in 0..3 {
            assert_pending!(response.poll());
        }
        assert_pending!(handle.poll_request());

        time::advance(Duration::from_millis(50)).await;
        assert_pending!(response.poll());
        assert_pending!(response.poll());

        let (_, send) = handle.next_request().await.unwrap();
        assert_pending!(handle.poll_request());

        send.send_response("created");
        assert_eq!(assert_ready_ok!(response.poll()), "created");
        assert_pending!(handle.poll_request());
    }

    #[tokio::test(start_paused = true)]
    async fn unclassified_request_is_sent_immediately() {
        let (mut service, mut handle) = mock::spawn_layer::<Request<()>, &'static str, _>(layer());

        assert_ready_ok!(service.poll_ready());
        let mut response = task::spawn(service.call(request(Method::HEAD, "/plans")));
        assert_pending!(response.poll());

        let (received, send) = handle.next_request().await.unwrap();
        assert_eq!(received.method(), Method::HEAD);
        send.send_response("ok");
        assert_eq!(assert_ready_ok!(response.poll()), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn inner_errors_pass_through() {
        let (mut service, mut handle) = mock::spawn_layer::<Request<()>, &'static str, _>(layer());

        assert_ready_ok!(service.poll_ready());
        let mut response = task::spawn(service.call(request(Method::POST, "/drivers")));
        time::advance(Duration::from_millis(50)).await;
        assert_pending!(response.poll());

        let (_, send) = handle.next_request().await.unwrap();
        send.send_error(std::io::Error::other("connection reset"));

        let error = assert_ready_err!(response.poll());
        assert_eq!(error.to_string(), "connection reset");
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_request_unchanged() {
        let (mut service, mut handle) =
            mock::spawn_layer::<Request<String>, &'static str, _>(layer());

        let original = Request::builder()
            .method(Method::PATCH)
            .uri(format!("{BASE}/plans/123?fields=id"))
            .header("x-trace", "abc")
            .body(String::from(r#"{"title":"Monday"}"#))
            .unwrap();

        assert_ready_ok!(service.poll_ready());
        let mut response = task::spawn(service.call(original));
        time::advance(Duration::from_millis(200)).await;
        assert_pending!(response.poll());

        let (received, send) = handle.next_request().await.unwrap();
        assert_eq!(received.method(), Method::PATCH);
        assert_eq!(received.uri().to_string(), format!("{BASE}/plans/123?fields=id"));
        assert_eq!(received.headers()["x-trace"], "abc");
        assert_eq!(received.body(), r#"{"title":"Monday"}"#);
        send.send_response("patched");
        assert_ready_ok!(response.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_reach_inner_service_in_order() {
        let (mock, mut handle) = mock::pair::<Request<()>, usize>();
        let service = layer().layer(mock);
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|index| {
                let service = service.clone();
                let request = Request::builder()
                    .method(Method::POST)
                    .uri(format!("{BASE}/drivers"))
                    .header("x-index", index.to_string())
                    .body(())
                    .unwrap();
                tokio::spawn(async move { service.oneshot(request).await })
            })
            .collect();

        let mut last = Duration::ZERO;
        for expected in 0..3 {
            let (received, send) = handle.next_request().await.unwrap();
            let elapsed = start.elapsed();
            assert!(elapsed >= last + Duration::from_millis(50), "{elapsed:?} after {last:?}");
            last = elapsed;

            let index: usize = received.headers()["x-index"].to_str().unwrap().parse().unwrap();
            assert_eq!(index, expected);
            send.send_response(index);
        }

        for (index, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), index);
        }
    }
}
