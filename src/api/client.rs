use super::types::{NewProject, NewTask, Project, ProjectId, Task, TaskId, TaskUpdate};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Rejection bodies are kept for display, truncated to this many characters.
const MAX_REJECTION_BODY_CHARS: usize = 512;

/// Errors surfaced by a single request against the task store.
///
/// Every call makes exactly one network exchange; none of these are retried.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or the response could not be received.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),
    /// The request exceeded the client timeout.
    #[error("Request timed out")]
    Timeout,
    /// The server answered with a non-2xx status.
    #[error("Server rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },
    /// A 2xx response whose body was not the expected JSON.
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// The request payload could not be serialized; nothing was sent.
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }
}

impl ApiError {
    /// True when the server was never reached (or never answered).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Typed REST client for projects, tasks and overdue notifications.
///
/// Cloning is cheap: the underlying `reqwest::Client` shares its connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// Build a client with a pooled HTTP connection. `None` leaves requests
    /// without a timeout.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ApiError::Network)?;
        Self::with_http_client(http, base_url)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_http_client(http: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let base = parse_base_url(base_url)?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    /// `GET /projects/`
    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let url = self.endpoint("projects/")?;
        self.fetch_json(Method::GET, url, None::<&()>).await
    }

    /// `POST /projects/`
    pub async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
        let url = self.endpoint("projects/")?;
        self.fetch_json(Method::POST, url, Some(project)).await
    }

    /// `DELETE /projects/{id}`. The response body is ignored.
    pub async fn delete_project(&self, id: ProjectId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("projects/{}", id))?;
        self.execute(Method::DELETE, url, None::<&()>).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------------

    /// `GET /tasks/`, scoped to one project when `filter` is set.
    pub async fn list_tasks(&self, filter: Option<ProjectId>) -> Result<Vec<Task>, ApiError> {
        let mut url = self.endpoint("tasks/")?;
        if let Some(project_id) = filter {
            url.query_pairs_mut()
                .append_pair("project_id", &project_id.to_string());
        }
        self.fetch_json(Method::GET, url, None::<&()>).await
    }

    /// `POST /tasks/`
    pub async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        let url = self.endpoint("tasks/")?;
        self.fetch_json(Method::POST, url, Some(task)).await
    }

    /// `PUT /tasks/{id}` with only the changed fields. Returns the canonical task.
    pub async fn update_task(&self, id: TaskId, update: &TaskUpdate) -> Result<Task, ApiError> {
        let url = self.endpoint(&format!("tasks/{}", id))?;
        self.fetch_json(Method::PUT, url, Some(update)).await
    }

    /// `DELETE /tasks/{id}`. The response body is ignored.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("tasks/{}", id))?;
        self.execute(Method::DELETE, url, None::<&()>).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    /// `GET /notifications/`: overdue, incomplete tasks as computed by the server.
    pub async fn list_notifications(&self) -> Result<Vec<Task>, ApiError> {
        let url = self.endpoint("notifications/")?;
        self.fetch_json(Method::GET, url, None::<&()>).await
    }

    // ------------------------------------------------------------------------
    // Internal Helpers
    // ------------------------------------------------------------------------

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::InvalidBaseUrl(e.to_string()))
    }

    async fn fetch_json<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = self.execute(method, url, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send one request and return the body of a 2xx response.
    async fn execute<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Vec<u8>, ApiError>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!(method = %method, path = %url.path(), query = ?url.query(), "API request");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body).map_err(ApiError::Encode)?);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            // A rejection body we can't read is still a rejection
            let body = read_limited_bytes(response, MAX_RESPONSE_SIZE)
                .await
                .map(|bytes| truncate_body(&bytes))
                .unwrap_or_default();
            tracing::debug!(method = %method, path = %url.path(), status = status.as_u16(), "API request rejected");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        read_limited_bytes(response, MAX_RESPONSE_SIZE).await
    }
}

/// Parse and normalize the API base URL.
///
/// Only http(s) is accepted. The path always ends with `/` so relative
/// endpoint joins append rather than replace the last segment.
fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| ApiError::InvalidBaseUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidBaseUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ApiError::InvalidBaseUrl(raw.to_string()));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn truncate_body(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(MAX_REJECTION_BODY_CHARS)
        .collect()
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
