use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::GcisError;

/// Blocking transport for the GCIS open-data endpoints.
pub trait GcisClient: Send + Sync {
    /// Downloads a whole file into memory.
    fn download(&self, url: &str) -> Result<Vec<u8>, GcisError>;
    /// Fetches one page of an API query and returns the raw body.
    fn fetch_page(&self, url: &str) -> Result<String, GcisError>;
}

#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub timeout: Option<Duration>,
    pub max_retries: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
            max_retries: 3,
        }
    }
}

#[derive(Clone)]
pub struct GcisHttpClient {
    client: Client,
    max_retries: usize,
}

impl GcisHttpClient {
    pub fn new(options: HttpOptions) -> Result<Self, GcisError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gcis-query/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GcisError::Http(err.to_string()))?,
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| GcisError::Http(err.to_string()))?;
        Ok(Self {
            client,
            max_retries: options.max_retries,
        })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, GcisError> {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        tracing::debug!(url, status, attempt, "retrying GCIS request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Self::handle_status(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        tracing::debug!(url, attempt, error = %err, "retrying GCIS request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(GcisError::Http(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, GcisError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "GCIS request failed".to_string());
        Err(GcisError::Status { status, message })
    }
}

impl GcisClient for GcisHttpClient {
    fn download(&self, url: &str) -> Result<Vec<u8>, GcisError> {
        let response = self.send_with_retries(url)?;
        let bytes = response
            .bytes()
            .map_err(|err| GcisError::Http(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn fetch_page(&self, url: &str) -> Result<String, GcisError> {
        let response = self.send_with_retries(url)?;
        response
            .text()
            .map_err(|err| GcisError::Http(err.to_string()))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
