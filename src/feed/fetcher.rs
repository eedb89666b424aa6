use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Retrieves the raw bytes of a feed document.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Tuning knobs for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Bound on one attempt, headers and body included
    pub timeout: Duration,
    /// Retries after the first attempt for 429, 5xx and truncated bodies
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub retry_base_delay: Duration,
    pub max_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            max_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// [`Fetcher`] over a shared `reqwest` client
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, options: FetchOptions) -> Self {
        Self { client, options }
    }

    /// Build a client identifying itself with `user_agent`
    pub fn with_user_agent(user_agent: &str, options: FetchOptions) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::new(client, options))
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.options.retry_base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    async fn attempt(&self, url: &str) -> Result<Attempt, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RateLimited);
        }
        if status.is_server_error() {
            return Ok(Attempt::Retryable(FetchError::HttpStatus(status.as_u16())));
        }
        // 4xx errors fail immediately
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, self.options.max_size).await {
            Ok(bytes) => Ok(Attempt::Done(bytes)),
            Err(e @ FetchError::IncompleteResponse { .. }) => Ok(Attempt::Retryable(e)),
            Err(e) => Err(e),
        }
    }
}

enum Attempt {
    Done(Vec<u8>),
    RateLimited,
    Retryable(FetchError),
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let attempt = tokio::time::timeout(self.options.timeout, self.attempt(url))
                .await
                .map_err(|_| FetchError::Timeout(self.options.timeout))?;

            let failure = match attempt {
                Ok(Attempt::Done(bytes)) => return Ok(bytes),
                Ok(Attempt::RateLimited) if retry_count >= self.options.max_retries => {
                    return Err(FetchError::RateLimited(self.options.max_retries));
                }
                Ok(Attempt::Retryable(e)) if retry_count >= self.options.max_retries => {
                    return Err(e);
                }
                Ok(Attempt::RateLimited) => "rate limited".to_string(),
                Ok(Attempt::Retryable(e)) => e.to_string(),
                Err(FetchError::Network(e)) if e.is_timeout() => {
                    return Err(FetchError::Timeout(self.options.timeout));
                }
                Err(e) => return Err(e),
            };

            let delay = self.backoff(retry_count);
            tracing::warn!(
                url = %url,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "Fetch failed, retrying after delay"
            );

            tokio::time::sleep(delay).await;
            retry_count += 1;
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
