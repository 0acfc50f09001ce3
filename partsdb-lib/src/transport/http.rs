use super::LOG_TARGET;
use crate::Result;
use core::time::Duration;
use layered::{Execute, Service, Stack};
use ohno::{IntoAppError, app_err, bail};
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use seatbelt::retry::{Backoff, Retry};
use seatbelt::timeout::Timeout;
use seatbelt::{RecoveryInfo, ResilienceContext};
use serde::de::DeserializeOwned;
use tick::Clock;
use url::Url;

/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Delay used for a 429 response without `Retry-After`, in seconds.
const DEFAULT_RATE_LIMIT_DELAY: u64 = 5;

/// Upper bound on a server-requested wait, in seconds.
const MAX_RATE_LIMIT_DELAY: u64 = 60;

/// HTTP client rooted at the catalogue's base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base: Url,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(base: &Url, timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("partsdb/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .into_app_err("unable to create HTTP client")?;

        // relative joins replace the last segment unless the base is a directory
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            timeout,
            max_retries,
            retry_delay: RETRY_BASE_DELAY,
        })
    }

    /// Override the base delay of the retry backoff.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, name: &str) -> Result<Url> {
        self.base
            .join(name)
            .into_app_err_with(|| format!("invalid resource name '{name}' for base URL {}", self.base))
    }

    /// GET `name`, retrying network failures, 5xx and 429 responses.
    ///
    /// The final response is returned whatever its status; callers check it.
    pub async fn get(&self, name: &str, headers: HeaderMap) -> Result<Response> {
        let url = self.url(name)?;

        let clock = Clock::new_tokio();
        let context = ResilienceContext::new(&clock).name("catalogue_get");

        let client = self.client.clone();
        let service = (
            Retry::layer("retry", &context)
                .clone_input()
                .recovery_with(|result: &Result<Response>, _| classify_response(result))
                .max_retry_attempts(self.max_retries)
                .base_delay(self.retry_delay)
                .backoff(Backoff::Exponential)
                .on_retry(|_output, args| {
                    log::debug!(
                        target: LOG_TARGET,
                        "retrying catalogue GET (attempt {}, delay {}ms)",
                        args.attempt().index() + 1,
                        args.retry_delay().as_millis(),
                    );
                }),
            Timeout::layer("timeout", &context)
                .timeout_error(|_| app_err!("catalogue request timed out"))
                .timeout(self.timeout),
            Execute::new(move |(url, headers): (Url, HeaderMap)| {
                let client = client.clone();
                async move {
                    client
                        .get(url.clone())
                        .headers(headers)
                        .send()
                        .await
                        .into_app_err_with(|| format!("unable to fetch {url}"))
                }
            }),
        )
            .into_service();

        service.execute((url, headers)).await
    }

    /// GET `name` and decode it as JSON, requiring a success status and a JSON content type.
    pub async fn fetch_json<T: DeserializeOwned>(&self, name: &str, what: &str) -> Result<T> {
        let response = ensure_success(self.get(name, HeaderMap::new()).await?, what)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("application/json") {
            bail!("{what}: response is not JSON, but '{content_type}': {}", response.url());
        }

        let bytes = response.bytes().await.into_app_err_with(|| format!("{what}: unable to read response"))?;
        crate::encoder::parse_json_bytes(&bytes).into_app_err_with(|| what.to_string())
    }

    /// GET `name` as text, requiring a success status.
    pub async fn fetch_text(&self, name: &str, what: &str) -> Result<String> {
        let response = ensure_success(self.get(name, HeaderMap::new()).await?, what)?;
        response.text().await.into_app_err_with(|| format!("{what}: unable to read response"))
    }
}

/// Fail with `what` unless the response has a success status.
pub fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        bail!("{what}: HTTP {status}: {}", response.url());
    }
    Ok(response)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

/// Decide whether a response is final or worth another attempt.
fn classify_response(result: &Result<Response>) -> RecoveryInfo {
    match result {
        Err(_) => RecoveryInfo::retry(),
        Ok(resp) if resp.status().is_server_error() => RecoveryInfo::retry(),
        Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
            let secs = rate_limit_delay(resp.headers());
            RecoveryInfo::retry().delay(Duration::from_secs(secs))
        }
        Ok(_) => RecoveryInfo::never(),
    }
}

/// Seconds to wait after a 429, honouring a numeric `Retry-After` up to a cap.
fn rate_limit_delay(headers: &HeaderMap) -> u64 {
    parse_retry_after(headers).map_or(DEFAULT_RATE_LIMIT_DELAY, |secs| secs.min(MAX_RATE_LIMIT_DELAY))
}
