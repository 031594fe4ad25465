use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::Request as HttpRequest;
use tower::Service;

use super::http::HttpError;

/// A `tower::Service` wrapper for `reqwest::Client`.
/// Accepts `http::Request<Option<Bytes>>`.
///
/// Every response is returned as received, whatever its status.
#[derive(Clone, Debug)]
pub struct ReqwestService {
    client: reqwest::Client,
}

impl ReqwestService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn new_with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, http_request: HttpRequest<Option<Bytes>>) -> Result<reqwest::Request, HttpError> {
        let (parts, body) = http_request.into_parts();

        let url_str = parts.uri.to_string();
        let url = reqwest::Url::parse(&url_str).map_err(|parse_err| HttpError::InvalidRequest {
            details: format!("Invalid URL '{}': {}", url_str, parse_err),
        })?;

        let mut request_builder = self.client.request(parts.method, url).headers(parts.headers);
        if let Some(body) = body {
            request_builder = request_builder.body(body);
        }

        request_builder.build().map_err(|e| HttpError::InvalidRequest {
            details: e.to_string(),
        })
    }
}

impl Default for ReqwestService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<HttpRequest<Option<Bytes>>> for ReqwestService {
    type Response = reqwest::Response;
    type Error = HttpError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, http_request: HttpRequest<Option<Bytes>>) -> Self::Future {
        let request = match self.build(http_request) {
            Ok(request) => request,
            Err(error) => return Box::pin(async move { Err(error) }),
        };

        let method = request.method().clone();
        let url = request.url().clone();
        let request_future = self.client.execute(request);

        Box::pin(async move {
            match request_future.await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status == http::StatusCode::TOO_MANY_REQUESTS {
                        warn!(%method, %url, %status, "Server error or rate limited");
                    } else {
                        debug!(%method, %url, %status, "Response received");
                    }
                    Ok(response)
                }
                Err(e) => {
                    if e.is_timeout() {
                        warn!(error = %e, %method, %url, "Request timed out");
                        Err(HttpError::Timeout)
                    } else if e.is_connect() {
                        error!(error = %e, %method, %url, "Connection error");
                        Err(HttpError::Transport {
                            source: Box::new(e),
                        })
                    } else {
                        error!(error = %e, %method, %url, "Other reqwest error");
                        Err(HttpError::ClientError {
                            source: Box::new(e),
                        })
                    }
                }
            }
        })
    }
}
