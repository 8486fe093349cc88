use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
};
use reqwest::{redirect, Client, Proxy};

use super::{
    header_str, request_headers, resolve_total_size, ClientBuildError, FetchError, FetchOptions,
    FetchResult, Fetcher,
};

/// General purpose transport on top of reqwest. Redirects are not followed
/// and certificates are not verified.
pub struct StandardClient {
    client: Client,
    options: FetchOptions,
}

impl StandardClient {
    pub fn new(options: FetchOptions) -> Result<Self, ClientBuildError> {
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(options.timeout + Duration::from_secs(3))
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(options.concurrency.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .danger_accept_invalid_hostnames(true)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = Proxy::all(proxy).map_err(|e| ClientBuildError::Proxy {
                proxy: proxy.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            options,
        })
    }

    async fn fetch_inner(&self, url: &str) -> Result<FetchResult, FetchError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in request_headers(url, &self.options) {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) else {
                tracing::debug!("skipping unusable header {name}");
                continue;
            };
            headers.insert(name, value);
        }

        let mut resp = self
            .client
            .get(parsed)
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let content_type = header_str(resp.headers(), CONTENT_TYPE).unwrap_or_default();
        let content_range = header_str(resp.headers(), CONTENT_RANGE);
        let content_length = header_str(resp.headers(), CONTENT_LENGTH);

        let cap = self.options.max_content_read;
        let mut content: Vec<u8> = Vec::new();
        while content.len() < cap {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    let take = chunk.len().min(cap - content.len());
                    content.extend_from_slice(&chunk[..take]);
                }
                Ok(None) => break,
                Err(e) => return Err(FetchError::Body(e.to_string())),
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
impl Fetcher for StandardClient {
    async fn fetch(&self, url: &str) -> FetchResult {
        match tokio::time::timeout(self.options.timeout, self.fetch_inner(url)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => FetchResult::failed(url, e),
            Err(_) => FetchResult::failed(url, FetchError::Timeout(self.options.timeout)),
        }
    }
}
