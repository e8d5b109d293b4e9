//! Single-URL HTTP fetching.
//!
//! One shared client per engine: redirects followed, the checker's user
//! agent, keep-alive connection reuse. Each fetch carries its own timeout
//! and races against the engine's pause and stop signals.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;

use super::signal::Signal;
use super::types::ScanError;

const USER_AGENT: &str = "LinkCheckerProBot/1.0";
const MAX_REDIRECTS: usize = 10;

/// Headers and body of a completed fetch.
#[derive(Debug)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Present only when the caller asked for a body and the response was a
    /// non-error HTML page.
    pub body: Option<String>,
}

/// Terminal outcomes of one fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    Response(FetchResponse),
    /// The per-request timeout elapsed.
    TimedOut,
    /// The soft-cancel fired; the URL should be re-queued for resume.
    PauseAborted,
    /// The hard-cancel fired; the attempt is simply dropped.
    StopAborted,
    /// Transport-level failure (DNS, connect, TLS, reset).
    Failed(String),
}

pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, ScanError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ScanError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Perform one GET.
    ///
    /// `want_body` asks for the response text when it is parseable HTML; the
    /// body read shares the request timeout. The signals abort the fetch at
    /// its next suspension point.
    pub async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        auth_header: Option<&str>,
        want_body: bool,
        pause: &Signal,
        stop: &Signal,
    ) -> FetchOutcome {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(value) = auth_header {
            request = request.header(AUTHORIZATION, value);
        }

        let attempt = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let parseable = status < 400
                && content_type
                    .as_deref()
                    .is_some_and(|ct| ct.contains("text/html"));
            let body = if want_body && parseable {
                Some(response.text().await?)
            } else {
                None
            };

            Ok::<_, reqwest::Error>(FetchResponse {
                status,
                content_type,
                body,
            })
        };

        tokio::select! {
            () = stop.fired() => FetchOutcome::StopAborted,
            () = pause.fired() => FetchOutcome::PauseAborted,
            result = attempt => match result {
                Ok(response) => FetchOutcome::Response(response),
                Err(e) if e.is_timeout() => FetchOutcome::TimedOut,
                Err(e) => FetchOutcome::Failed(flatten_error(&e)),
            },
        }
    }
}

/// Collapse reqwest's error chain into one line for the result entry.
fn flatten_error(error: &reqwest::Error) -> String {
    use std::error::Error as _;
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message = format!("{message}: {cause}");
        source = cause.source();
    }
    message
}
