mod digest;

use std::time::Duration;

use futures::StreamExt;
use reqwest::{
    header::{AUTHORIZATION, WWW_AUTHENTICATE},
    Client as ReqwestClient, Method, Response, StatusCode,
};
use tracing::{debug, trace};
use tryhard::RetryPolicy;
use url::Url;

use self::digest::DigestSession;
use crate::{
    catalog::PageFetcher,
    downloader::{ByteStream, StreamFetcher},
    error::FetchError,
};

/// Fixed user name of the TiVo digest realm; the password is the media access key.
pub const USERNAME: &str = "tivo";
const QUERY_PATH: &str = "/TiVoConnect";
const PAGE_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Authenticated session against one TiVo.
///
/// The device serves a self-signed certificate, so certificate validation is
/// turned off. Cookies set by the device are kept for the whole run.
pub struct TivoClient {
    http: ReqwestClient,
    query_url: Url,
    auth: DigestSession,
    retries: u32,
}
impl TivoClient {
    /// `address` is a host (`192.168.1.20`) or a full base URL.
    pub fn new(address: &str, mak: &str, retries: u32) -> Result<Self, FetchError> {
        let base = if address.contains("://") {
            address.to_string()
        } else {
            format!("https://{address}")
        };
        let query_url = Url::parse(&base)
            .and_then(|x| x.join(QUERY_PATH))
            .map_err(|source| FetchError::InvalidUrl { url: base, source })?;

        let http = ReqwestClient::builder()
            .danger_accept_invalid_certs(true)
            .cookie_store(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            query_url,
            auth: DigestSession::new(USERNAME, mak),
            retries,
        })
    }

    fn page_url(&self, offset: u64) -> Url {
        let mut url = self.query_url.clone();
        url.query_pairs_mut()
            .append_pair("Command", "QueryContainer")
            .append_pair("Container", "/NowPlaying")
            .append_pair("Recurse", "Yes")
            .append_pair("AnchorOffset", &offset.to_string());
        url
    }

    #[tracing::instrument(skip(self))]
    async fn query_page(&self, offset: u64) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .send(Method::POST, self.page_url(offset), Some(PAGE_TIMEOUT))
            .await?;
        let body = resp.bytes().await?;
        trace!(bytes = body.len(), "Page received");

        Ok(body.to_vec())
    }

    #[tracing::instrument(skip(self), fields(url = url.as_str()))]
    async fn open_stream(&self, url: &Url) -> Result<Response, FetchError> {
        self.send(Method::GET, url.clone(), None).await
    }

    /// Send a request, answering a digest challenge once if the device asks.
    async fn send(
        &self,
        method: Method,
        url: Url,
        timeout: Option<Duration>,
    ) -> Result<Response, FetchError> {
        let uri = request_uri(&url);

        let authorization = self.auth.authorization(&method, &uri).await?;
        let resp = self
            .request(method.clone(), url.clone(), timeout, authorization)
            .await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp);
        }

        trace!("Device sent a digest challenge");
        let Some(challenge) = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|x| x.to_str().ok())
        else {
            return Err(FetchError::Auth(
                "device answered 401 without a challenge".to_string(),
            ));
        };
        self.auth.accept_challenge(challenge).await?;

        let authorization = self.auth.authorization(&method, &uri).await?;
        let resp = self.request(method, url, timeout, authorization).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(FetchError::Auth(
                "device rejected the media access key".to_string(),
            ));
        }

        check_status(resp)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        timeout: Option<Duration>,
        authorization: Option<String>,
    ) -> Result<Response, FetchError> {
        let mut req = self.http.request(method, url);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        if let Some(authorization) = authorization {
            req = req.header(AUTHORIZATION, authorization);
        }

        Ok(req.send().await?)
    }
}

#[async_trait::async_trait]
impl PageFetcher for TivoClient {
    async fn fetch_page(&self, offset: u64) -> Result<Vec<u8>, FetchError> {
        tryhard::retry_fn(|| self.query_page(offset))
            .retries(self.retries)
            .custom_backoff(retry_policy)
            .on_retry(|attempt, _next_delay, err| {
                let e = err.to_string();

                async move {
                    debug!(attempt, ?e, "Retrying page fetch");
                }
            })
            .await
    }
}

#[async_trait::async_trait]
impl StreamFetcher for TivoClient {
    async fn fetch_stream(&self, url: &str) -> Result<ByteStream, FetchError> {
        let url = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        // Only opening the stream is retried; a transfer that breaks midway
        // is reported to the caller.
        let resp = tryhard::retry_fn(|| self.open_stream(&url))
            .retries(self.retries)
            .custom_backoff(retry_policy)
            .on_retry(|attempt, _next_delay, err| {
                let e = err.to_string();

                async move {
                    debug!(attempt, ?e, "Retrying stream open");
                }
            })
            .await?;

        Ok(resp
            .bytes_stream()
            .map(|x| x.map_err(FetchError::from))
            .boxed())
    }
}

/// Back off on transient failures; give up at once on auth and client errors.
fn retry_policy(_attempt: u32, err: &FetchError) -> RetryPolicy {
    if err.is_retryable() {
        RetryPolicy::Delay(RETRY_DELAY)
    } else {
        RetryPolicy::Break
    }
}

/// Path and query, as the digest `uri` field wants them.
fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn check_status(resp: Response) -> Result<Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(FetchError::Status {
            url: resp.url().to_string(),
            status,
        })
    }
}
