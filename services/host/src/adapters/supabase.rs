//! services/host/src/adapters/supabase.rs
//!
//! A thin `reqwest` wrapper around the hosted backend: PostgREST tables under
//! `/rest/v1`, remote procedures under `/rest/v1/rpc` and GoTrue under
//! `/auth/v1`. Every adapter in this module tree goes through it, so status
//! codes and error bodies are mapped onto `PortError` in one place.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use unveil_core::ports::{PortError, PortResult};

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    media: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        // Audio bodies stream for as long as a track plays.
        let media = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            http,
            media,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: None,
        })
    }

    /// A copy that acts on behalf of a signed-in user, so row-level security
    /// sees their identity. The connection pool is shared.
    pub fn authorized(&self, access_token: &str) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            ..self.clone()
        }
    }

    pub fn rest(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("rest/v1/{table}"))
    }

    pub fn rpc(&self, function: &str) -> RequestBuilder {
        self.request(Method::POST, &format!("rest/v1/rpc/{function}"))
    }

    pub fn auth(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, &format!("auth/v1/{path}"))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.http
            .request(method, format!("{}/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Sends the request and decodes a JSON body.
    pub async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        let response = Self::send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed response body: {e}")))
    }

    /// Starts a GET on a stored audio file and hands back the streaming
    /// response, partial content included.
    pub async fn open_media(&self, url: &str, range: Option<&str>) -> PortResult<Response> {
        let mut request = self.media.get(url);
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range);
        }
        Self::send(request).await
    }

    /// Sends the request and ignores whatever body comes back.
    pub async fn execute(&self, request: RequestBuilder) -> PortResult<()> {
        Self::send(request).await.map(|_| ())
    }

    async fn send(request: RequestBuilder) -> PortResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!("Backend answered {}: {}", status, body);
        Err(map_error(status, &body))
    }
}

fn transport_error(e: reqwest::Error) -> PortError {
    warn!("Request to the backend failed: {}", e);
    if e.is_timeout() || e.is_connect() || e.is_request() {
        PortError::Network(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

/// The union of PostgREST and GoTrue error bodies.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    fn text(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.msg.clone())
            .or_else(|| self.error.clone())
    }
}

pub(crate) fn map_error(status: StatusCode, body: &str) -> PortError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = parsed.text().unwrap_or_else(|| body.to_string());

    if parsed.code().as_deref() == Some(UNIQUE_VIOLATION) || status == StatusCode::CONFLICT {
        return PortError::Conflict(detail);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => PortError::NotFound(detail),
        StatusCode::BAD_REQUEST if parsed.error.as_deref() == Some("invalid_grant") => {
            PortError::Unauthorized
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PortError::Validation(detail)
        }
        s if s.is_server_error() => PortError::Network(format!("{s}: {detail}")),
        s => PortError::Unexpected(format!("{s}: {detail}")),
    }
}

/// `in.("a","b")` for PostgREST list filters.
pub(crate) fn in_list<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quoted: Vec<String> = values
        .into_iter()
        .map(|v| format!("\"{}\"", v.as_ref().replace('"', "\\\"")))
        .collect();
    format!("({})", quoted.join(","))
}
