//! HTTP Fetcher - reqwest-backed Target Retrieval
//!
//! Wraps reqwest with a per-request timeout and a fixed user agent.
//! No retries: a failed fetch is reported once and the next probe
//! cycle tries again.

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::trace;

use crate::ports::fetcher::{FetchError, FetchOutcome, Fetcher};

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
  /// Whole-request timeout (connect, headers and body).
  pub timeout: Duration,
  /// Value of the `User-Agent` header.
  pub user_agent: String,
}

impl Default for HttpFetcherConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(10),
      user_agent: concat!("hashcheck-exporter/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

/// Production [`Fetcher`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  /// Underlying HTTP client.
  http: Client,
  /// Fetcher configuration.
  config: HttpFetcherConfig,
}

impl HttpFetcher {
  /// Create a new fetcher.
  pub fn new(config: HttpFetcherConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .user_agent(config.user_agent.clone())
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self { http, config })
  }

  /// Configured request timeout.
  pub const fn timeout(&self) -> Duration {
    self.config.timeout
  }

  fn classify(&self, err: &reqwest::Error, body: bool) -> FetchError {
    if err.is_timeout() {
      FetchError::Timeout(self.config.timeout)
    } else if body {
      FetchError::Body(error_chain(err))
    } else {
      FetchError::Transport(error_chain(err))
    }
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, url: &str) -> FetchOutcome {
    let started = Instant::now();
    let sent = self.http.get(url).send().await;
    let elapsed = started.elapsed();

    let response = match sent {
      Ok(response) => response,
      Err(e) => {
        return FetchOutcome::Failed {
          elapsed,
          error: self.classify(&e, false),
        };
      }
    };

    let status = response.status().as_u16();
    trace!(url, status, elapsed_ms = elapsed.as_millis() as u64, "Response headers received");

    match response.bytes().await {
      Ok(body) => FetchOutcome::Complete {
        elapsed,
        status,
        body: body.to_vec(),
      },
      Err(e) => FetchOutcome::Truncated {
        elapsed,
        status,
        error: self.classify(&e, true),
      },
    }
  }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &reqwest::Error) -> String {
  let mut message = err.to_string();
  let mut source = err.source();
  while let Some(cause) = source {
    message.push_str(": ");
    message.push_str(&cause.to_string());
    source = cause.source();
  }
  message
}
