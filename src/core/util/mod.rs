use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use http::{header, Request, Response};
use serde::{de::DeserializeOwned, Serialize};

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder()
        .header(header::ACCEPT, "application/json")
        .header(header::CONTENT_TYPE, "application/json")
}

/// Build a JSON request.
pub(crate) fn json_request<T: Serialize>(
    builder: http::request::Builder,
    body: &T,
) -> Result<Request<Vec<u8>>> {
    builder
        .body(serde_json::to_vec(body).context("failed to serialize request body")?)
        .context("failed to build request")
}

/// Parse a JSON response, failing on any non-success status.
pub(crate) fn json_response<T: DeserializeOwned>(response: Response<Vec<u8>>) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        bail!(
            "unexpected status {status}: {}",
            String::from_utf8_lossy(response.body())
        )
    }
    serde_json::from_slice(response.body()).context("failed to parse response body")
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}
