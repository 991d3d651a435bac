use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, HeaderValue, RETRY_AFTER};
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tokio::time::{sleep, timeout};
use tracing::warn;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_https_client() -> AdapterResult<HyperClient> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Ok(Client::builder().build::<_, Body>(connector))
}

/// Appends a trailing slash after checking the scheme and URI syntax.
pub(crate) fn sanitize_base_url(provider: &str, input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(format!(
            "{provider} base URL must start with http:// or https://"
        )));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| {
        AdapterError::configuration(format!("invalid {provider} base URL: {err}"))
    })?;
    Ok(base)
}

/// POSTs a JSON body and returns the raw bytes of a successful response.
pub(crate) async fn post_json(
    client: &HyperClient,
    provider: &str,
    endpoint: &Uri,
    bearer: Option<&str>,
    body: Vec<u8>,
    limit: Duration,
) -> AdapterResult<Vec<u8>> {
    let mut builder = Request::post(endpoint.clone()).header(CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(hyper::header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = builder.body(Body::from(body)).map_err(|err| {
        AdapterError::transport(format!("failed to build {provider} request: {err}"))
    })?;

    let response = timeout(limit, client.request(request))
        .await
        .map_err(|_| AdapterError::transport(format!("{provider} request timed out")))?
        .map_err(|err| AdapterError::transport(format!("{provider} request failed: {err}")))?;

    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(parse_retry_after);
    let bytes = to_bytes(response.into_body()).await.map_err(|err| {
        AdapterError::transport(format!("failed to read {provider} response: {err}"))
    })?;

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AdapterError::RateLimited { retry_after });
    }

    if status.is_server_error() {
        let reason = String::from_utf8_lossy(&bytes);
        return Err(AdapterError::transport(format!(
            "{provider} returned {status}: {reason}"
        )));
    }

    if !status.is_success() {
        let reason = String::from_utf8_lossy(&bytes);
        return Err(AdapterError::response(format!(
            "{provider} returned {status}: {reason}"
        )));
    }

    Ok(bytes.to_vec())
}

fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    value
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Bounded retry with a constant delay, applied to retryable adapter errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
    max_delay: Duration,
}

/// Longest `Retry-After` honoured unless a policy sets its own cap.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

impl RetryPolicy {
    /// Creates a policy making at most `max_retries` additional attempts.
    #[must_use]
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Caps the delay a server may request through `Retry-After`.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Returns the maximum number of retries.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs `operation` until it succeeds, fails permanently, or retries run out.
    ///
    /// Returns the value together with the number of attempts made.
    pub(crate) async fn run<T, F, Fut>(&self, provider: &str, mut operation: F) -> AdapterResult<(T, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => return Ok((value, attempts)),
                Err(err) if err.is_retryable() && attempts <= self.max_retries => {
                    let wait = self.wait_for(&err);
                    warn!(provider, attempt = attempts, wait = ?wait, error = %err, "retrying model request");
                    sleep(wait).await;
                }
                Err(err) if attempts > 1 => return Err(AdapterError::exhausted(attempts, err)),
                Err(err) => return Err(err),
            }
        }
    }
}

impl RetryPolicy {
    fn wait_for(&self, err: &AdapterError) -> Duration {
        match err {
            AdapterError::RateLimited {
                retry_after: Some(after),
            } => (*after).min(self.max_delay.max(self.delay)),
            _ => self.delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}
