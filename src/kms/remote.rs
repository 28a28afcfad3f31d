use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use base64::prelude::*;
use http::{header, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use zeroize::Zeroizing;

use super::{KeyManager, KeyPair, KeyType};
use crate::{
    config::BaseUrl,
    core::util::{base_request, json_request, json_response, AsyncHttpClient},
    error::{Result, WalletError},
};

/// HTTP client type used by [RemoteKms].
pub type HttpClient = Arc<dyn AsyncHttpClient + Send + Sync>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyResponse {
    #[serde(rename = "keyID")]
    key_id: String,
    public_key: String,
}

#[derive(Deserialize)]
struct SignResponse {
    signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest<'a> {
    key_type: KeyType,
    private_key: &'a str,
}

/// A key manager delegating to a remote key server.
///
/// Every request carries the authorization token supplied when the wallet was
/// unlocked as a bearer token. Key material never leaves the server except
/// for explicit imports.
pub struct RemoteKms {
    key_server: BaseUrl,
    auth_token: Zeroizing<String>,
    client: HttpClient,
}

impl std::fmt::Debug for RemoteKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKms")
            .field("key_server", &self.key_server.as_str())
            .finish_non_exhaustive()
    }
}

impl RemoteKms {
    pub fn new(key_server: BaseUrl, auth_token: impl Into<String>, client: HttpClient) -> Self {
        Self {
            key_server,
            auth_token: Zeroizing::new(auth_token.into()),
            client,
        }
    }

    async fn call<T: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> anyhow::Result<Response<Vec<u8>>> {
        let url = self
            .key_server
            .join(path)
            .context("failed to build key server url")?;

        let builder = base_request()
            .method(method)
            .uri(url.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {}", *self.auth_token));

        let request = match body {
            Some(body) => json_request(builder, body)?,
            None => builder.body(Vec::new()).context("failed to build request")?,
        };

        self.client
            .execute(request)
            .await
            .context("key server request failed")
    }

    fn key_pair(&self, key_type: KeyType, response: Response<Vec<u8>>) -> Result<KeyPair> {
        let key: KeyResponse = json_response(response)?;
        Ok(KeyPair {
            key_id: key.key_id,
            key_type,
            public_key: key.public_key,
        })
    }
}

fn check_key_exists(key_id: &str, response: &Response<Vec<u8>>) -> Result<()> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(WalletError::KeyNotFound(key_id.to_owned()));
    }
    Ok(())
}

#[async_trait]
impl KeyManager for RemoteKms {
    async fn create(&self, key_type: KeyType) -> Result<KeyPair> {
        let response = self
            .call(Method::POST, "keys", Some(&json!({ "keyType": key_type })))
            .await?;
        self.key_pair(key_type, response)
    }

    async fn import_private_key(&self, key_type: KeyType, private_key: &[u8]) -> Result<KeyPair> {
        let encoded = Zeroizing::new(BASE64_URL_SAFE_NO_PAD.encode(private_key));
        let response = self
            .call(
                Method::POST,
                "keys/import",
                Some(&ImportRequest {
                    key_type,
                    private_key: &encoded,
                }),
            )
            .await?;
        self.key_pair(key_type, response)
    }

    async fn sign(&self, key_id: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .call(
                Method::POST,
                &format!("keys/{key_id}/sign"),
                Some(&json!({ "message": BASE64_URL_SAFE_NO_PAD.encode(payload) })),
            )
            .await?;
        check_key_exists(key_id, &response)?;

        let signed: SignResponse = json_response(response)?;
        Ok(BASE64_URL_SAFE_NO_PAD
            .decode(signed.signature)
            .context("key server returned an invalid signature encoding")?)
    }

    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        let response = self
            .call::<()>(Method::GET, &format!("keys/{key_id}"), None)
            .await?;
        check_key_exists(key_id, &response)?;

        let key: KeyResponse = json_response(response)?;
        Ok(BASE64_URL_SAFE_NO_PAD
            .decode(key.public_key)
            .context("key server returned an invalid public key encoding")?)
    }
}
