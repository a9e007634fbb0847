use bytes::Bytes;
use reqwest::blocking;
use reqwest::header::RETRY_AFTER;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

/// Longest wait honoured from a `Retry-After` header.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Simple HTTP Response Struct
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The status code of the HTTP response
    pub status_code: u16,
    /// The response body of the HTTP response
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns true for any 2xx status code.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP Error Struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError(pub String);

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait that describes HTTP related operations that can be performed
pub trait Httper {
    /// Performs a HTTP GET request
    fn get(&self, url: String, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError>;
    /// Performs a HTTP POST request
    fn post(&self, url: String, body: String, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError>;
    /// Performs a HTTP PUT request with a raw body
    fn put(&self, url: String, body: Vec<u8>, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError>;
}

/// How often and how patiently a failed request is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every following one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Throttling and server-side failures are worth another attempt.
pub fn is_retryable_status(status_code: u16) -> bool {
    status_code == 429 || (500..600).contains(&status_code)
}

/// Parses a `Retry-After` value given in whole seconds, capped at one minute.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Struct that implements Httper
pub struct HttpClient {
    pub client: blocking::Client,
    pub retry: RetryPolicy,
}

impl HttpClient {
    /// Builds a blocking client with the given per-request timeout.
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, HttpError> {
        let client = blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HttpError(format!("Failed to build HTTP client - {}", err)))?;
        Ok(HttpClient { client, retry })
    }

    fn execute(&self, method: &str, url: &str, request: blocking::RequestBuilder) -> Result<HttpResponse, HttpError> {
        let mut attempt = 0;
        loop {
            let current = request
                .try_clone()
                .ok_or_else(|| HttpError(format!("Unable to clone {} request for {}", method, url)))?;
            let retries_left = attempt < self.retry.max_retries;

            let response = match current.send() {
                Ok(resp) => resp,
                Err(err) if retries_left => {
                    let delay = self.retry.delay_for(attempt);
                    warn!("{} {} failed ({}), retrying in {:?}", method, url, err, delay);
                    thread::sleep(delay);
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(HttpError(format!("Failed to perform {} request at {} - {}", method, url, err))),
            };

            let status = response.status();
            if is_retryable_status(status.as_u16()) && retries_left {
                let delay = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after)
                    .unwrap_or_else(|| self.retry.delay_for(attempt));
                warn!("{} {} returned {}, retrying in {:?}", method, url, status, delay);
                thread::sleep(delay);
                attempt += 1;
                continue;
            }

            let bytes = response
                .bytes()
                .map_err(|err| HttpError(format!("Failed to read body - {}", err)))?;
            debug!("{} {} -> {} ({} bytes)", method, url, status, bytes.len());
            return Ok(HttpResponse {
                status_code: status.as_u16(),
                body: bytes,
            });
        }
    }
}

fn with_headers(mut request: blocking::RequestBuilder, headers: Vec<(String, String)>) -> blocking::RequestBuilder {
    for (name, value) in headers {
        request = request.header(name, value);
    }
    request
}

impl Httper for HttpClient {
    fn get(&self, url: String, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError> {
        let request = with_headers(self.client.get(url.as_str()), headers);
        self.execute("GET", &url, request)
    }
    fn post(&self, url: String, body: String, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError> {
        let request = with_headers(self.client.post(url.as_str()).body(body), headers);
        self.execute("POST", &url, request)
    }
    fn put(&self, url: String, body: Vec<u8>, headers: Vec<(String, String)>) -> Result<HttpResponse, HttpError> {
        let request = with_headers(self.client.put(url.as_str()).body(body), headers);
        self.execute("PUT", &url, request)
    }
}

/// Builds the `Authorization` header for a bearer token.
pub fn bearer(access_token: &str) -> (String, String) {
    (String::from("Authorization"), format!("Bearer {}", access_token))
}
