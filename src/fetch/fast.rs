use std::time::Duration;

use async_trait::async_trait;
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use hyper::{Body, Client, Request, Uri};
use hyper_tls::HttpsConnector;

use super::{
    header_str, request_headers, resolve_total_size, ClientBuildError, FetchError, FetchOptions,
    FetchResult, Fetcher,
};

/// Higher throughput transport: a bare hyper client with its own keep-alive
/// pool. It does not support proxies.
pub struct FastClient {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    options: FetchOptions,
}

impl FastClient {
    pub fn new(options: FetchOptions) -> Result<Self, ClientBuildError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(options.timeout));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        let https = HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls)));

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(options.concurrency.max(1) * 2)
            .build::<_, Body>(https);

        if options.proxy.as_deref().map(|p| !p.trim().is_empty()).unwrap_or(false) {
            tracing::warn!("the fast transport does not support proxies, requests go direct");
        }

        Ok(Self { client, options })
    }

    async fn fetch_inner(&self, url: &str) -> Result<FetchResult, FetchError> {
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| FetchError::InvalidUrl(e.to_string()))?;
        let mut req = Request::get(uri)
            .body(Body::empty())
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        for (name, value) in request_headers(url, &self.options) {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) else {
                tracing::debug!("skipping unusable header {name}");
                continue;
            };
            req.headers_mut().insert(name, value);
        }

        let mut resp = self
            .client
            .request(req)
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let content_type = header_str(resp.headers(), CONTENT_TYPE).unwrap_or_default();
        let content_range = header_str(resp.headers(), CONTENT_RANGE);
        let content_length = header_str(resp.headers(), CONTENT_LENGTH);

        let cap = self.options.max_content_read;
        let mut content: Vec<u8> = Vec::new();
        let body = resp.body_mut();
        while content.len() < cap {
            match body.data().await {
                Some(Ok(chunk)) => {
                    let take = chunk.len().min(cap - content.len());
                    content.extend_from_slice(&chunk[..take]);
                }
                Some(Err(e)) => return Err(FetchError::Body(e.to_string())),
                None => break,
            }
        }

        let total_size = resolve_total_size(
            content_range.as_deref(),
            content_length.as_deref(),
            content.len(),
        );
        Ok(FetchResult {
            url: url.to_string(),
            content,
            total_size,
            status,
            content_type,
            error: None,
        })
    }
}

#[async_trait]
impl Fetcher for FastClient {
    async fn fetch(&self, url: &str) -> FetchResult {
        match tokio::time::timeout(self.options.timeout, self.fetch_inner(url)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => FetchResult::failed(url, e),
            Err(_) => FetchResult::failed(url, FetchError::Timeout(self.options.timeout)),
        }
    }
}
