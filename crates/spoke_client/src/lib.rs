//! Spoke REST API client.
//!
//! Every request goes through the throttle from `spoke_rate_limit`, so callers
//! can fire requests as fast as they like and stay within the API's per-route
//! limits. See <https://developer.dispatch.spoke.com> for endpoints.
//!
//! ```no_run
//! use serde_json::Value;
//! use spoke_client::{SpokeClient, SpokeClientConfig};
//!
//! # async fn run() -> Result<(), spoke_client::SpokeClientError> {
//! let client = SpokeClient::new(SpokeClientConfig {
//!     api_key: "your_spoke_api_key".to_string(),
//!     ..SpokeClientConfig::default()
//! })?;
//!
//! let plans: Value = client.get_json("/plans").await?;
//! # Ok(())
//! # }
//! ```

use std::{env, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{
    HeaderValue, Method, Request as HttpRequest,
    header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};
use tower::{Service, ServiceBuilder, ServiceExt};
use tracing::{debug, info};

use spoke_rate_limit::Error as CrateError;
use spoke_rate_limit::throttle::{
    Classifier, DelaySettings, RateLimit, RateLimitLayer, Scheduler, Throttle,
    reqwest_integration::ReqwestService,
};

// --- Constants ---
pub const DEFAULT_BASE_URL: &str = "https://api.getcircuit.com/public/v0.2b";
const API_KEY_ENV_VAR: &str = "SPOKE_API_KEY";
const BASE_URL_ENV_VAR: &str = "SPOKE_BASE_URL";
const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const JSON: &str = "application/json";

// --- Error Definition ---
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SpokeClientError {
    #[snafu(display("Initialization error: {message}"))]
    Initialization { message: String },

    #[snafu(display("Missing environment variable {name}: {source}"))]
    MissingEnv {
        name: &'static str,
        source: env::VarError,
    },

    #[snafu(display("Failed to build reqwest client: {source}"))]
    ClientBuild { source: reqwest::Error },

    #[snafu(display("Invalid header value: {source}"))]
    InvalidHeader {
        source: http::header::InvalidHeaderValue,
    },

    #[snafu(display("HTTP request construction error: {source}"))]
    RequestConstruction { source: http::Error },

    #[snafu(display("Transport error: {source}"))]
    Transport { source: CrateError },

    #[snafu(display("API error: {status} - {body}"))]
    Api { status: u16, body: String },

    #[snafu(display("Failed to read response body: {source}"))]
    ResponseBody { source: reqwest::Error },

    #[snafu(display("Failed to serialize JSON request: {source}"))]
    JsonSerialization { source: serde_json::Error },

    #[snafu(display("Failed to deserialize JSON response: {source}"))]
    JsonDeserialization { source: serde_json::Error },
}

pub type Result<T, E = SpokeClientError> = std::result::Result<T, E>;

// --- Configuration ---
#[derive(Clone, Debug)]
pub struct SpokeClientConfig {
    /// Generate one at <https://dispatch.spoke.com/settings/integrations>.
    pub api_key: String,
    pub base_url: String,
    pub delays: DelaySettings,
    pub user_agent: Option<String>,
    pub reqwest_client: Option<reqwest::Client>,
}

impl Default for SpokeClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            delays: DelaySettings::default(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            reqwest_client: None,
        }
    }
}

impl SpokeClientConfig {
    /// Reads `SPOKE_API_KEY` and, optionally, `SPOKE_BASE_URL`, after loading
    /// a `.env` file if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = env::var(API_KEY_ENV_VAR).context(MissingEnvSnafu {
            name: API_KEY_ENV_VAR,
        })?;
        let base_url = env::var(BASE_URL_ENV_VAR).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key,
            base_url,
            ..Self::default()
        })
    }
}

// --- The Spoke Client ---
/// A throttled Spoke API client.
///
/// Cloning is cheap and clones share one throttle, so a client can be handed
/// to many tasks and their requests are still spaced per rate class.
#[derive(Clone)]
pub struct SpokeClient<T = ReqwestService> {
    service: RateLimit<T>,
    config: Arc<SpokeClientConfig>,
    authorization: HeaderValue,
    base_url: String,
}

impl SpokeClient<ReqwestService> {
    pub fn new(config: SpokeClientConfig) -> Result<Self> {
        let reqwest_client = match &config.reqwest_client {
            Some(client) => client.clone(),
            None => reqwest::Client::builder()
                .timeout(Duration::from_secs(90))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .context(ClientBuildSnafu)?,
        };

        Self::with_transport(config, ReqwestService::new_with_client(reqwest_client))
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SpokeClientConfig::from_env()?)
    }
}

impl<T> SpokeClient<T>
where
    T: Service<HttpRequest<Option<Bytes>>, Response = reqwest::Response> + Clone,
    T::Error: Into<CrateError>,
{
    /// Builds a client over any transport, throttled by `config.delays`.
    pub fn with_transport(config: SpokeClientConfig, transport: T) -> Result<Self> {
        let base_path = base_path(&config.base_url)?;
        let throttle = Throttle::from_parts(
            Classifier::new(base_path),
            Arc::new(Scheduler::new(config.delays)),
        );
        Self::with_throttle(config, transport, throttle)
    }

    /// Builds a client that shares `throttle` with other clients.
    ///
    /// `config.delays` is ignored; the throttle's scheduler decides.
    pub fn with_throttle(
        config: SpokeClientConfig,
        transport: T,
        throttle: Throttle,
    ) -> Result<Self> {
        if config.api_key.is_empty() {
            return InitializationSnafu {
                message: "API key cannot be empty",
            }
            .fail();
        }

        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", config.api_key)).context(InvalidHeaderSnafu)?;
        authorization.set_sensitive(true);

        let service = ServiceBuilder::new()
            .layer(RateLimitLayer::from_throttle(throttle))
            .service(transport);

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!(target: "spoke_client", %base_url, "SpokeClient initialized");
        debug!(target: "spoke_client", delays = ?config.delays, "Client delay settings");

        Ok(Self {
            service,
            config: Arc::new(config),
            authorization,
            base_url,
        })
    }

    pub fn config(&self) -> &SpokeClientConfig {
        &self.config
    }

    pub fn throttle(&self) -> &Throttle {
        self.service.throttle()
    }

    /// Absolute URL for an API path such as `/plans?maxPageSize=10`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Sends a request and returns the response as received, whatever its status.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response> {
        let request = self.build_request(method, path, body, None)?;
        self.dispatch(request).await
    }

    pub async fn get_json<R>(&self, path: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self.send(Method::GET, path, None).await?;
        read_json(response).await
    }

    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send_json(Method::POST, path, body).await?;
        read_json(response).await
    }

    pub async fn patch_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send_json(Method::PATCH, path, body).await?;
        read_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.send(Method::DELETE, path, None).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.context(ResponseBodySnafu)?;
        ApiSnafu {
            status: status.as_u16(),
            body,
        }
        .fail()
    }

    async fn send_json<B>(&self, method: Method, path: &str, body: &B) -> Result<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let payload = Bytes::from(serde_json::to_vec(body).context(JsonSerializationSnafu)?);
        let request = self.build_request(method, path, Some(payload), Some(JSON))?;
        self.dispatch(request).await
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        content_type: Option<&'static str>,
    ) -> Result<HttpRequest<Option<Bytes>>> {
        let mut builder = HttpRequest::builder()
            .method(method)
            .uri(self.url(path))
            .header(AUTHORIZATION, self.authorization.clone())
            .header(http::header::ACCEPT, JSON);

        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(user_agent) = &self.config.user_agent {
            builder = builder.header(
                USER_AGENT,
                HeaderValue::from_str(user_agent).context(InvalidHeaderSnafu)?,
            );
        }

        builder.body(body).context(RequestConstructionSnafu)
    }

    async fn dispatch(&self, request: HttpRequest<Option<Bytes>>) -> Result<reqwest::Response> {
        debug!(target: "spoke_client", method = %request.method(), uri = %request.uri(), "Sending request");

        let mut service = self.service.clone();
        let ready = ServiceExt::<HttpRequest<Option<Bytes>>>::ready(&mut service)
            .await
            .map_err(|e| SpokeClientError::Transport { source: e.into() })?;
        let response = ready
            .call(request)
            .await
            .map_err(|e| SpokeClientError::Transport { source: e.into() })?;

        debug!(target: "spoke_client", status = %response.status(), "Received response");
        Ok(response)
    }
}

/// Path component of the base URL, used to recognise API routes.
fn base_path(base_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(base_url).map_err(|e| SpokeClientError::Initialization {
        message: format!("Invalid base URL '{}': {}", base_url, e),
    })?;
    Ok(url.path().trim_end_matches('/').to_string())
}

async fn read_json<R>(response: reqwest::Response) -> Result<R>
where
    R: DeserializeOwned,
{
    let status = response.status();
    let body = response.text().await.context(ResponseBodySnafu)?;

    if !status.is_success() {
        return ApiSnafu {
            status: status.as_u16(),
            body,
        }
        .fail();
    }

    serde_json::from_str(&body).context(JsonDeserializationSnafu)
}
