use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, HOST, ORIGIN,
    TE, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://sdk.vercel.ai";

const ACCEPT_VALUE: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Longest upstream error body kept in [`Error::Upstream`].
const MAX_ERROR_BODY: usize = 2048;

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: Url,
    pub timeout: Duration,
    pub proxy_url: Option<String>,
    /// Fixed User-Agent; a randomized Chrome 107 string is used when unset.
    pub user_agent: Option<String>,
}

impl TransportConfig {
    /// Defaults overridable via env:
    /// - `PLAYGROUND_BASE_URL` (default `https://sdk.vercel.ai`)
    /// - `PLAYGROUND_HTTP_TIMEOUT_SECS` (default 60)
    /// - `PLAYGROUND_PROXY_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_base(None)
    }

    /// Like [`from_env`](Self::from_env), with an explicit base URL taking
    /// precedence over `PLAYGROUND_BASE_URL`.
    pub fn from_env_with_base(base_url: Option<&str>) -> Result<Self> {
        let base = match base_url {
            Some(base) => base.to_string(),
            None => env::var("PLAYGROUND_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };
        let timeout_secs = env::var("PLAYGROUND_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        Ok(Self {
            base_url: parse_base_url(&base)?,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            proxy_url: env::var("PLAYGROUND_PROXY_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            user_agent: None,
        })
    }
}

/// Parse and sanity-check a service base URL.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let invalid = |details: String| {
        Error::configuration_with_context(
            format!("invalid base URL '{}'", raw),
            ErrorContext::new()
                .with_field_path("PLAYGROUND_BASE_URL")
                .with_details(details)
                .with_source("transport"),
        )
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Chrome 107 on Windows 7 with a randomized build and patch number.
pub fn browser_user_agent() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/107.0.{}.{} Safari/537.36",
        rng.gen_range(0..=9999),
        rng.gen_range(0..=99)
    )
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    base_headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(
                env::var("PLAYGROUND_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy URL '{}'", proxy_url),
                    ErrorContext::new()
                        .with_field_path("PLAYGROUND_PROXY_URL")
                        .with_details(e.to_string())
                        .with_source("transport"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(browser_user_agent);

        let mut base_headers = HeaderMap::new();
        base_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|_| TransportError::InvalidHeader { name: "user-agent" })?,
        );
        base_headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        base_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        base_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        base_headers.insert(TE, HeaderValue::from_static("trailers"));
        base_headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            base_headers,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Headers attached to every request.
    pub fn base_headers(&self) -> &HeaderMap {
        &self.base_headers
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// GET `path` and return the body as text; non-2xx is an error.
    pub async fn get_text(&self, path: &str) -> std::result::Result<String, TransportError> {
        let url = self.url_for(path);
        tracing::debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .headers(self.base_headers.clone())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.text().await?)
    }

    /// Per-generation headers: the minted token plus origin headers derived from the base URL.
    pub fn generation_headers(&self, token: &str) -> std::result::Result<HeaderMap, TransportError> {
        let origin = self.base_url.origin().ascii_serialization();
        let host = match (self.base_url.host_str(), self.base_url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("custom-encoding"),
            HeaderValue::from_str(token)
                .map_err(|_| TransportError::InvalidHeader { name: "custom-encoding" })?,
        );
        headers.insert(
            HOST,
            HeaderValue::from_str(&host).map_err(|_| TransportError::InvalidHeader { name: "host" })?,
        );
        let origin_value = HeaderValue::from_str(&origin)
            .map_err(|_| TransportError::InvalidHeader { name: "origin" })?;
        headers.insert(ORIGIN, origin_value.clone());
        headers.insert(HeaderName::from_static("referrer"), origin_value);
        headers.insert(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("empty"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-mode"),
            HeaderValue::from_static("cors"),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("same-origin"),
        );
        Ok(headers)
    }

    /// POST a JSON body and return the response body as a byte stream.
    ///
    /// The stream is pulled lazily; dropping it closes the connection.
    pub async fn post_stream(
        &self,
        path: &str,
        body: &serde_json::Value,
        headers: HeaderMap,
    ) -> Result<BoxStream<'static, Bytes>> {
        let url = self.url_for(path);
        tracing::debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .headers(self.base_headers.clone())
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(Error::Upstream {
                status: status.as_u16(),
                endpoint: path.to_string(),
                body,
            });
        }

        let byte_stream = response
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(byte_stream))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid value for header {name}")]
    InvalidHeader { name: &'static str },

    #[error("Transport error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(&TransportConfig {
            base_url: parse_base_url(base).unwrap(),
            timeout: Duration::from_secs(5),
            proxy_url: None,
            user_agent: None,
        })
        .unwrap()
    }

    #[test]
    fn user_agent_looks_like_chrome_107() {
        let ua = browser_user_agent();
        assert!(ua.starts_with("Mozilla/5.0 (Windows NT 6.1)"));
        assert!(ua.contains("Chrome/107.0."));
        assert!(ua.ends_with("Safari/537.36"));
    }

    #[test]
    fn base_headers_mimic_a_browser() {
        let t = transport("https://sdk.vercel.ai");
        let h = t.base_headers();
        assert_eq!(h[ACCEPT_LANGUAGE], "en-US,en;q=0.5");
        assert_eq!(h[TE], "trailers");
        assert_eq!(h[UPGRADE_INSECURE_REQUESTS], "1");
        assert!(h.contains_key(USER_AGENT));
    }

    #[test]
    fn generation_headers_derive_from_base_url() {
        let t = transport("https://sdk.vercel.ai");
        let h = t.generation_headers("tok").unwrap();
        assert_eq!(h["custom-encoding"], "tok");
        assert_eq!(h[HOST], "sdk.vercel.ai");
        assert_eq!(h[ORIGIN], "https://sdk.vercel.ai");
        assert_eq!(h["referrer"], "https://sdk.vercel.ai");
        assert_eq!(h["sec-fetch-site"], "same-origin");

        let local = transport("http://127.0.0.1:9000/");
        let h = local.generation_headers("tok").unwrap();
        assert_eq!(h[HOST], "127.0.0.1:9000");
        assert_eq!(h[ORIGIN], "http://127.0.0.1:9000");
    }

    #[test]
    fn joins_paths_without_double_slashes() {
        let t = transport("http://127.0.0.1:9000/");
        assert_eq!(t.url_for("/openai.jpeg"), "http://127.0.0.1:9000/openai.jpeg");
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            parse_base_url("ftp://example.com"),
            Err(Error::Configuration { .. })
        ));
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn rejects_tokens_that_are_not_header_safe() {
        let t = transport("https://sdk.vercel.ai");
        assert!(matches!(
            t.generation_headers("bad\ntoken"),
            Err(TransportError::InvalidHeader { .. })
        ));
    }
}
