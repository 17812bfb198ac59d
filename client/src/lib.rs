//! HTTP client for the partner portal backend.
//!
//! # Architecture
//!
//! Every call goes through [`ApiClient::request`]:
//!
//! ```text
//! RequestDescriptor -> url_for() -> session lookup -> identity headers
//!                                                          |
//!                                                          v
//!                     classify() <- retry::send_with_retry() (trace headers per attempt)
//!                         |
//!                         v
//!                  JSON value | {} | ApiError
//! ```
//!
//! Requests are sent to `{base_url}{path}`, where `base_url` is the same-origin
//! proxy that attaches backend credentials. This crate only adds trace and
//! user-identification headers.
//!
//! # Error Handling
//!
//! Failures are returned as [`ApiError`]. Callers branch on
//! [`ApiError::is_not_found`], [`ApiError::is_service_unavailable`] and
//! [`ApiError::is_network_error`] to decide between degrading and
//! propagating. A 401 is reported as [`ApiError::SessionExpired`] and the
//! [`SessionSource`] is notified.

mod error;
mod guid;
pub mod headers;
pub mod portal;
pub mod retry;
pub mod session;

pub use error::ApiError;
pub use retry::RetryConfig;
pub use session::{NoSession, SessionSource, StaticSession};

pub use portal_types;

use std::sync::Arc;
use std::time::Duration;

use portal_config::{PortalConfig, ResolvedSettings};
use portal_types::{ApiPath, HttpMethod, RequestDescriptor, TraceId, user_id_namespace};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 32;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

const USER_AGENT: &str = concat!("portal-client/", env!("CARGO_PKG_VERSION"));

fn base_client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(timeout)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// Connection and policy settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Proxy base, e.g. `http://localhost:3000/api/proxy`. No trailing slash.
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
    /// Identity provider issuer; scopes derived user ids.
    pub keycloak_issuer: Option<String>,
    /// Prefix for GUID lookups; the identifier is appended as a path segment.
    pub guid_lookup_path: ApiPath,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(portal_config::DEFAULT_TIMEOUT_SECS),
            retry: RetryConfig::default(),
            keycloak_issuer: None,
            guid_lookup_path: ApiPath::new(portal_config::DEFAULT_GUID_LOOKUP_PATH)?,
        })
    }

    pub fn from_settings(settings: &ResolvedSettings) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
            retry: RetryConfig {
                max_retries: settings.max_retries,
                base_delay: settings.retry_base_delay,
            },
            keycloak_issuer: settings.keycloak_issuer.clone(),
            guid_lookup_path: ApiPath::new(settings.guid_lookup_path.as_str())?,
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_keycloak_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.keycloak_issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn with_guid_lookup_path(mut self, path: ApiPath) -> Self {
        self.guid_lookup_path = path;
        self
    }
}

/// Portal API client. Cheap to share behind an `Arc`.
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Arc<dyn SessionSource>,
    user_namespace: Uuid,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("user_namespace", &self.user_namespace)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<dyn SessionSource>) -> Result<Self, ApiError> {
        Url::parse(&config.base_url).map_err(|e| ApiError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let http = base_client_builder(config.timeout)
            .build()
            .map_err(ApiError::Build)?;
        let user_namespace = user_id_namespace(config.keycloak_issuer.as_deref());

        Ok(Self {
            http,
            config,
            session,
            user_namespace,
        })
    }

    /// Build from loaded configuration, using the `[session]` table (if any)
    /// as a fixed identity.
    pub fn from_portal_config(config: &PortalConfig) -> Result<Self, ApiError> {
        let client_config = ClientConfig::from_settings(&config.resolve())?;
        let session: Arc<dyn SessionSource> =
            match config.session.as_ref().and_then(StaticSession::from_config) {
                Some(session) => Arc::new(session),
                None => Arc::new(NoSession),
            };
        Self::new(client_config, session)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue `descriptor` and return the decoded JSON body, or `{}` when the
    /// response is not JSON.
    pub async fn request(&self, descriptor: &RequestDescriptor) -> Result<Value, ApiError> {
        let url = self.url_for(&descriptor.path)?;
        let trace_id = TraceId::generate();

        let identity = match self.session.current_user().await {
            Some(user) => headers::identity_headers(&user, &self.user_namespace),
            None => HeaderMap::new(),
        };

        let retry_config = if descriptor.retry {
            self.config.retry.clone()
        } else {
            RetryConfig::single_attempt()
        };

        let method = to_reqwest_method(descriptor.method);
        let build_request = || {
            let builder = self
                .http
                .request(method.clone(), url.clone())
                .headers(identity.clone())
                .header(CONTENT_TYPE, "application/json");
            match &descriptor.body {
                Some(body) => builder.json(body),
                None => builder,
            }
        };

        tracing::debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            trace_id = %trace_id,
            "Sending API request"
        );

        let response = match retry::send_with_retry(build_request, &trace_id, &retry_config).await
        {
            retry::RetryOutcome::Response(response) => response,
            retry::RetryOutcome::Network { attempts, source } => {
                tracing::warn!(
                    path = %descriptor.path,
                    trace_id = %trace_id,
                    attempts,
                    error = %source,
                    "API request failed"
                );
                return Err(ApiError::Network { attempts, source });
            }
            retry::RetryOutcome::NonRetryable(source) => return Err(ApiError::Request(source)),
        };

        self.classify(response, &descriptor.path, &trace_id).await
    }

    /// [`request`](Self::request) followed by typed decoding.
    pub async fn request_json<T>(&self, descriptor: &RequestDescriptor) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let value = self.request(descriptor).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(&RequestDescriptor::get(ApiPath::new(path)?)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(&RequestDescriptor::post(ApiPath::new(path)?).with_body(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(&RequestDescriptor::put(ApiPath::new(path)?).with_body(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(&RequestDescriptor::delete(ApiPath::new(path)?)).await
    }

    fn url_for(&self, path: &ApiPath) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.config.base_url, path.as_str());
        Url::parse(&raw).map_err(|e| ApiError::InvalidUrl {
            url: raw,
            reason: e.to_string(),
        })
    }

    async fn classify(
        &self,
        response: Response,
        path: &ApiPath,
        trace_id: &TraceId,
    ) -> Result<Value, ApiError> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(path = %path, trace_id = %trace_id, "Backend rejected session");
            self.session.session_expired();
            return Err(ApiError::SessionExpired);
        }

        if status.is_success() {
            return decode_success(response).await;
        }

        let body = read_capped_error_body(response).await;
        tracing::debug!(status = %status, path = %path, trace_id = %trace_id, "API error response");

        Err(match status {
            StatusCode::SERVICE_UNAVAILABLE => ApiError::ServiceUnavailable { body },
            StatusCode::NOT_FOUND => ApiError::NotFound {
                path: path.to_string(),
                body,
            },
            _ => ApiError::Status {
                status: status.as_u16(),
                body,
            },
        })
    }
}

const fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

async fn decode_success(response: Response) -> Result<Value, ApiError> {
    if !is_json_content_type(response.headers()) {
        return Ok(empty_object());
    }

    let bytes = response.bytes().await.map_err(ApiError::Body)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(empty_object());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn read_capped_error_body(response: Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
