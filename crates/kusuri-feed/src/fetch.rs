//! HTTP fetcher for feed payloads.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use tracing::{debug, info};

use crate::FetchError;

pub const ACCEPT_CSV: &str = "text/csv";
pub const ACCEPT_XML: &str = "application/xml";
/// Body encoding assumed when the response does not declare one.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// One GET against a feed endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub url: String,
    /// Query pairs in order. Keys may repeat.
    pub query: Vec<(String, String)>,
    pub accept: &'static str,
    /// A `404` whose body contains this marker means "nothing published
    /// yet" rather than an error.
    pub no_data_marker: Option<&'static str>,
    /// Encoding of the body when the response has no `charset` parameter.
    /// `None` means UTF-8.
    pub charset: Option<&'static str>,
}

impl FeedRequest {
    pub fn get(url: impl Into<String>, accept: &'static str) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            accept,
            no_data_marker: None,
            charset: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_no_data_marker(mut self, marker: &'static str) -> Self {
        self.no_data_marker = Some(marker);
        self
    }

    pub fn with_charset(mut self, charset: &'static str) -> Self {
        self.charset = Some(charset);
        self
    }

    /// Values of every `key` parameter, in order.
    pub fn params(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Body(String),
    /// The upstream answered that no data exists yet.
    NoData,
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FeedRequest) -> Result<FetchOutcome, FetchError>;
}

/// reqwest-backed fetcher. No retries; intermediary caching is suppressed.
pub struct HttpFetcher {
    client: reqwest::Client,
    cache_bust: bool,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str, cache_bust: bool) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, cache_bust })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FeedRequest) -> Result<FetchOutcome, FetchError> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(ACCEPT, request.accept)
            .query(&request.query);
        if self.cache_bust {
            let cb = chrono::Utc::now().timestamp_millis().to_string();
            builder = builder.query(&[("cb", cb)]);
        }

        info!(url = %request.url, "fetching feed");
        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp
            .text_with_charset(request.charset.unwrap_or(DEFAULT_CHARSET))
            .await?;

        if status == StatusCode::NOT_FOUND
            && let Some(marker) = request.no_data_marker
            && body.contains(marker)
        {
            info!(url = %request.url, "upstream has no data yet");
            return Ok(FetchOutcome::NoData);
        }
        if !status.is_success() {
            return Err(FetchError::status(status.as_u16(), &body));
        }

        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "feed fetched");
        Ok(FetchOutcome::Body(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::Router;
    use axum::extract::RawQuery;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
    use axum::routing::get;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher(cache_bust: bool) -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), "kusuri-test", cache_bust).unwrap()
    }

    fn query_map(raw: Option<String>) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for pair in raw.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            map.entry(k.to_string()).or_default().push(v.to_string());
        }
        map
    }

    #[tokio::test]
    async fn body_returned_with_no_cache_headers() {
        let app = Router::new().route(
            "/feed.csv",
            get(|headers: AxumHeaders, RawQuery(q): RawQuery| async move {
                let q = query_map(q);
                format!(
                    "{}|{}|{}|{}|{}",
                    headers["cache-control"].to_str().unwrap(),
                    headers["pragma"].to_str().unwrap(),
                    headers["accept"].to_str().unwrap(),
                    headers["user-agent"].to_str().unwrap(),
                    q.contains_key("cb"),
                )
            }),
        );
        let base = serve(app).await;

        let req = FeedRequest::get(format!("{base}/feed.csv"), ACCEPT_CSV);
        let out = fetcher(true).fetch(&req).await.unwrap();
        assert_eq!(
            out,
            FetchOutcome::Body("no-cache|no-cache|text/csv|kusuri-test|true".into())
        );

        let out = fetcher(false).fetch(&req).await.unwrap();
        assert_eq!(
            out,
            FetchOutcome::Body("no-cache|no-cache|text/csv|kusuri-test|false".into())
        );
    }

    #[tokio::test]
    async fn repeated_query_keys_are_sent_in_order() {
        let app = Router::new().route(
            "/proxy",
            get(|RawQuery(q): RawQuery| async move {
                let q = query_map(q);
                q.get("item").cloned().unwrap_or_default().join(",")
            }),
        );
        let base = serve(app).await;

        let req = FeedRequest::get(format!("{base}/proxy"), ACCEPT_XML)
            .param("item", "DATMEDNAME")
            .param("item", "DATGENERIC");
        let out = fetcher(false).fetch(&req).await.unwrap();
        assert_eq!(out, FetchOutcome::Body("DATMEDNAME,DATGENERIC".into()));
    }

    #[tokio::test]
    async fn non_success_status_is_error_with_snippet() {
        let long = "e".repeat(1000);
        let app = Router::new().route(
            "/broken",
            get(move || async move { (AxumStatus::INTERNAL_SERVER_ERROR, long) }),
        );
        let base = serve(app).await;

        let req = FeedRequest::get(format!("{base}/broken"), ACCEPT_CSV);
        let err = fetcher(false).fetch(&req).await.unwrap_err();
        match err {
            FetchError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn marked_404_is_no_data_and_plain_404_is_error() {
        let app = Router::new()
            .route(
                "/pollen",
                get(|| async { (AxumStatus::NOT_FOUND, "error: data does not exist") }),
            )
            .route("/gone", get(|| async { (AxumStatus::NOT_FOUND, "not here") }));
        let base = serve(app).await;

        let req = FeedRequest::get(format!("{base}/pollen"), ACCEPT_CSV)
            .with_no_data_marker("data does not exist");
        assert_eq!(fetcher(false).fetch(&req).await.unwrap(), FetchOutcome::NoData);

        let req = FeedRequest::get(format!("{base}/gone"), ACCEPT_CSV)
            .with_no_data_marker("data does not exist");
        let err = fetcher(false).fetch(&req).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn undeclared_body_decodes_with_request_charset() {
        // "インフルエンザ,北海道" in Shift_JIS.
        const SJIS: [u8; 21] = [
            0x83, 0x43, 0x83, 0x93, 0x83, 0x74, 0x83, 0x8B, 0x83, 0x47, 0x83, 0x93, 0x83, 0x55,
            0x2C, 0x96, 0x6B, 0x8A, 0x43, 0x93, 0xB9,
        ];
        let app = Router::new()
            .route(
                "/sjis.csv",
                get(|| async { ([(CONTENT_TYPE, "text/csv")], SJIS.to_vec()) }),
            )
            .route(
                "/utf8.csv",
                get(|| async { ([(CONTENT_TYPE, "text/csv; charset=utf-8")], "北海道") }),
            );
        let base = serve(app).await;

        let req = FeedRequest::get(format!("{base}/sjis.csv"), ACCEPT_CSV).with_charset("Shift_JIS");
        assert_eq!(
            fetcher(false).fetch(&req).await.unwrap(),
            FetchOutcome::Body("インフルエンザ,北海道".into())
        );

        let req = FeedRequest::get(format!("{base}/utf8.csv"), ACCEPT_CSV).with_charset("Shift_JIS");
        assert_eq!(
            fetcher(false).fetch(&req).await.unwrap(),
            FetchOutcome::Body("北海道".into())
        );
    }

    #[test]
    fn params_filter_by_key() {
        let req = FeedRequest::get("http://x", ACCEPT_XML)
            .param("count", "20")
            .param("item", "A")
            .param("item", "B");
        assert_eq!(req.params("item"), vec!["A", "B"]);
        assert_eq!(req.params("count"), vec!["20"]);
        assert!(req.params("word").is_empty());
    }
}
