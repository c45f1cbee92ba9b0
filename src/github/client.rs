use anyhow::Context;
use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// How long to wait before retrying a throttled request that did not say
/// how long to wait.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Longest `Retry-After` we are willing to honor.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(15 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct GithubClient {
    token: SecretString,
    client: Client,
    api_url: String,
    /// Used when a throttled response carries no usable `Retry-After`.
    retry_fallback: Duration,
    /// Cancelled on shutdown; interrupts a throttle wait.
    cancel: CancellationToken,
}

impl GithubClient {
    pub fn new(token: SecretString, api_url: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(GithubClient {
            token,
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            retry_fallback: DEFAULT_RETRY_AFTER,
            cancel: CancellationToken::new(),
        })
    }

    /// Creates a client for `GITHUB_API_URL`, or api.github.com if unset.
    pub fn new_from_env(token: SecretString) -> anyhow::Result<Self> {
        let api_url =
            std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(token, api_url)
    }

    /// Sets how long to sleep before retrying a throttled request without a
    /// `Retry-After` header.
    pub fn set_retry_fallback(&mut self, fallback: Duration) {
        self.retry_fallback = fallback;
    }

    /// Makes throttle waits of GET requests give up as soon as `cancel` is
    /// cancelled.
    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Sends a request, retrying it once if GitHub throttled it.
    ///
    /// The response is returned whatever its status; callers decide what
    /// counts as success.
    pub(crate) async fn send(&self, req: RequestBuilder) -> anyhow::Result<Response> {
        let req_dbg = format!("{req:?}");
        tracing::debug!("send {req_dbg}");
        let req = req
            .build()
            .with_context(|| format!("building reqwest {req_dbg}"))?;
        let retry = clone_request(&req)?;

        let resp = self
            .client
            .execute(req)
            .await
            .with_context(|| format!("sending {req_dbg}"))?;
        let Some(sleep) = needs_retry(&resp, self.retry_fallback) else {
            return Ok(resp);
        };

        tracing::warn!(
            "throttled ({}), retrying after {} seconds",
            resp.status(),
            sleep.as_secs()
        );
        // A write may follow another write on the same thread, so only reads
        // give up early.
        if *retry.method() == Method::GET {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    anyhow::bail!("shutting down while throttled on {req_dbg}");
                }
                _ = tokio::time::sleep(sleep) => {}
            }
        } else {
            tokio::time::sleep(sleep).await;
        }
        self.client
            .execute(retry)
            .await
            .with_context(|| format!("retrying {req_dbg}"))
    }

    /// Sends a request and returns its body, failing on any non-success
    /// status.
    pub(crate) async fn send_req(&self, req: RequestBuilder) -> anyhow::Result<Bytes> {
        let resp = self.send(req).await?;
        let url = resp.url().clone();
        let maybe_err = resp.error_for_status_ref().err();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read response body from {url}"))?;
        if let Some(e) = maybe_err {
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("response: {}", String::from_utf8_lossy(&body)));
        }
        Ok(body)
    }

    pub(crate) async fn json<T>(&self, req: RequestBuilder) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.send_req(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        tracing::trace!("get {:?}", url);
        self.client.get(url).configure(self)
    }

    pub(crate) fn patch(&self, url: &str) -> RequestBuilder {
        tracing::trace!("patch {:?}", url);
        self.client.patch(url).configure(self)
    }

    pub(crate) fn put(&self, url: &str) -> RequestBuilder {
        tracing::trace!("put {:?}", url);
        self.client.put(url).configure(self)
    }
}

fn clone_request(req: &Request) -> anyhow::Result<Request> {
    req.try_clone()
        .with_context(|| format!("request to {} cannot be retried", req.url()))
}

/// Returns how long to wait if `resp` says the caller has been throttled.
///
/// GitHub signals secondary rate limits with a 429, or with a 403 that
/// carries `Retry-After`. A plain 403 is a permission error and is not
/// retried.
pub(crate) fn needs_retry(resp: &Response, fallback: Duration) -> Option<Duration> {
    throttle_delay(resp.status(), resp.headers(), fallback)
}

fn throttle_delay(status: StatusCode, headers: &HeaderMap, fallback: Duration) -> Option<Duration> {
    let retry_after = headers.get(RETRY_AFTER);
    match status {
        StatusCode::TOO_MANY_REQUESTS => {}
        StatusCode::FORBIDDEN if retry_after.is_some() => {}
        _ => return None,
    }
    let secs = retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let delay = secs.map(Duration::from_secs).unwrap_or(fallback);
    Some(delay.min(MAX_RETRY_AFTER))
}

trait RequestSend: Sized {
    fn configure(self, g: &GithubClient) -> Self;
}

impl RequestSend for RequestBuilder {
    fn configure(self, g: &GithubClient) -> RequestBuilder {
        let auth = reqwest::header::HeaderValue::from_maybe_shared(format!(
            "Bearer {}",
            g.token.expose_secret()
        ));
        let builder = self
            .header(USER_AGENT, "mutebot")
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match auth {
            Ok(mut auth) => {
                auth.set_sensitive(true);
                builder.header(AUTHORIZATION, auth)
            }
            // Left off; GitHub will answer 401 and the caller reports it.
            Err(_) => builder,
        }
    }
}
