use crate::encoding::decode_base64_lenient;
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use std::num::NonZeroUsize;
use tokio::task::JoinSet;
use tokio::time::{Duration, sleep};

const INLINE_PREFIX: &str = "inline:";
const DATA_PREFIX: &str = "data:";
const DEFAULT_CONCURRENCY: NonZeroUsize = NonZeroUsize::new(5).unwrap();
/// Status reported for descriptors that succeed without a network request.
const LOCAL_SOURCE_STATUS: u16 = StatusCode::OK.as_u16();

#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub retry_backoff: Duration,
    /// Descriptors fetched per batch. A batch completes before the next starts.
    pub concurrency: NonZeroUsize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(300),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("malformed data URI: {0}")]
    DataUri(&'static str),

    #[error("empty body")]
    EmptyBody,
}

impl FetchError {
    /// HTTP status to report for this failure. Anything that did not produce
    /// a response reports 0.
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Status(status) => status.as_u16(),
            _ => 0,
        }
    }
}

/// Result of fetching one source descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOutcome {
    pub source: String,
    pub ok: bool,
    pub status: u16,
    pub body: Option<String>,
    pub error: Option<String>,
}

impl FetchOutcome {
    fn success(source: &str, status: u16, body: String) -> Self {
        FetchOutcome {
            source: source.to_string(),
            ok: true,
            status,
            body: Some(body),
            error: None,
        }
    }

    fn failure(source: &str, status: u16, error: String) -> Self {
        FetchOutcome {
            source: source.to_string(),
            ok: false,
            status,
            body: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl SourceFetcher {
    pub fn new(options: FetchOptions) -> Self {
        SourceFetcher {
            client: reqwest::Client::new(),
            options,
        }
    }

    /// Fetches every descriptor. Never fails: each descriptor yields exactly
    /// one outcome, returned in the same order as `sources`.
    pub async fn fetch_all(&self, sources: &[String]) -> Vec<FetchOutcome> {
        let mut outcomes = Vec::with_capacity(sources.len());

        for batch in sources.chunks(self.options.concurrency.get()) {
            let mut join_set = JoinSet::new();

            for (offset, source) in batch.iter().enumerate() {
                let fetcher = self.clone();
                let source = source.clone();
                join_set.spawn(async move { (offset, fetcher.fetch_one(&source).await) });
            }

            let mut results: Vec<Option<FetchOutcome>> = vec![None; batch.len()];
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((offset, outcome)) => results[offset] = Some(outcome),
                    Err(e) => tracing::error!("Fetch task panicked: {}", e),
                }
            }

            let results = results.into_iter().zip(batch).map(|(result, source)| {
                result.unwrap_or_else(|| {
                    FetchOutcome::failure(source, 0, "fetch task did not complete".to_string())
                })
            });

            outcomes.extend(results);
        }

        outcomes
    }

    pub async fn fetch_one(&self, source: &str) -> FetchOutcome {
        let result = if let Some(literal) = source.strip_prefix(INLINE_PREFIX) {
            Ok((LOCAL_SOURCE_STATUS, literal.to_string()))
        } else if source.starts_with(DATA_PREFIX) {
            decode_data_uri(source).map(|body| (LOCAL_SOURCE_STATUS, body))
        } else {
            self.fetch_http(source).await
        };

        match result.and_then(non_empty_body) {
            Ok((status, body)) => FetchOutcome::success(source, status, body),
            Err(e) => {
                tracing::warn!(source, error = %e, "source fetch failed");
                FetchOutcome::failure(source, e.status(), e.to_string())
            }
        }
    }

    /// One attempt plus exactly one retry after the backoff.
    async fn fetch_http(&self, url: &str) -> Result<(u16, String), FetchError> {
        match self.attempt(url).await {
            Ok(fetched) => Ok(fetched),
            Err(e) => {
                tracing::debug!(url, error = %e, "retrying source fetch");
                sleep(self.options.retry_backoff).await;
                self.attempt(url).await
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<(u16, String), FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.options.timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await.map_err(classify)?;
        Ok((status.as_u16(), body))
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Request(e)
    }
}

fn non_empty_body((status, body): (u16, String)) -> Result<(u16, String), FetchError> {
    if body.is_empty() {
        Err(FetchError::EmptyBody)
    } else {
        Ok((status, body))
    }
}

/// Decodes `data:[<mediatype>][;base64],<data>`.
pub fn decode_data_uri(uri: &str) -> Result<String, FetchError> {
    let rest = uri
        .strip_prefix(DATA_PREFIX)
        .ok_or(FetchError::DataUri("missing data: prefix"))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or(FetchError::DataUri("missing comma"))?;

    let is_base64 = meta
        .rsplit(';')
        .next()
        .is_some_and(|param| param.trim().eq_ignore_ascii_case("base64"));

    if is_base64 {
        let unescaped = percent_decode_str(data)
            .decode_utf8()
            .map_err(|_| FetchError::DataUri("invalid percent-encoding"))?;
        decode_base64_lenient(&unescaped).ok_or(FetchError::DataUri("invalid base64 payload"))
    } else {
        percent_decode_str(data)
            .decode_utf8()
            .map(|decoded| decoded.into_owned())
            .map_err(|_| FetchError::DataUri("payload is not UTF-8"))
    }
}
