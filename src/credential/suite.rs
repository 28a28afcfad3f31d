use std::fmt::Debug;

use anyhow::{bail, Context};
use async_trait::async_trait;
use base64::prelude::*;
use serde_json::{json, Map, Value};

use crate::{
    core::did::VerificationMethod,
    error::Result,
    kms::{keys, KeyManager, KeyType},
};

pub const ED25519_SIGNATURE_2018: &str = "Ed25519Signature2018";
pub const JSON_WEB_SIGNATURE_2020: &str = "JsonWebSignature2020";

/// A linked data signature suite.
///
/// Suites sign and verify a signing input built from the unsigned document
/// and the proof configuration, producing the value stored in the proof's
/// `jws` property.
#[async_trait]
pub trait SignatureSuite: Debug + Send + Sync {
    /// Value of the proof `type` property.
    fn proof_type(&self) -> &str;

    /// Whether the suite can sign with keys of `key_type`.
    fn supports(&self, key_type: KeyType) -> bool;

    /// Sign `signing_input` with the key `key_id` held by `key_manager`.
    async fn sign(
        &self,
        key_manager: &dyn KeyManager,
        key_id: &str,
        key_type: KeyType,
        signing_input: &[u8],
    ) -> Result<String>;

    /// Verify a `jws` over `signing_input` against a raw public key.
    fn verify(
        &self,
        key_type: KeyType,
        public_key: &[u8],
        signing_input: &[u8],
        jws: &str,
    ) -> anyhow::Result<bool>;
}

/// Selective disclosure signatures, i.e. BBS+.
///
/// Only the derivation and verification of proofs is delegated; building the
/// revealed document and the derived proof object is done by the wallet.
#[async_trait]
pub trait SelectiveDisclosure: Debug + Send + Sync {
    /// Compute the `proofValue` of a derived proof revealing `revealed` out of
    /// the signed `credential`, bound to `nonce`.
    async fn derive_proof_value(
        &self,
        credential: &Value,
        revealed: &Value,
        nonce: &[u8],
    ) -> anyhow::Result<String>;

    /// Verify a `BbsBlsSignature2020` or `BbsBlsSignatureProof2020` proof over
    /// `document` (without its proof).
    async fn verify_proof(
        &self,
        document: &Value,
        proof: &Value,
        method: &VerificationMethod,
    ) -> anyhow::Result<bool>;
}

/// Detached, unencoded-payload JWS suites (RFC 7797).
#[derive(Debug, Clone)]
pub struct JwsSuite {
    proof_type: &'static str,
    key_types: &'static [KeyType],
}

impl JwsSuite {
    pub fn ed25519_signature_2018() -> Self {
        Self {
            proof_type: ED25519_SIGNATURE_2018,
            key_types: &[KeyType::Ed25519],
        }
    }

    pub fn json_web_signature_2020() -> Self {
        Self {
            proof_type: JSON_WEB_SIGNATURE_2020,
            key_types: &[KeyType::Ed25519, KeyType::EcdsaP256],
        }
    }
}

fn alg(key_type: KeyType) -> &'static str {
    match key_type {
        KeyType::Ed25519 => "EdDSA",
        KeyType::EcdsaP256 => "ES256",
    }
}

fn jws_payload(header_b64: &str, signing_input: &[u8]) -> Vec<u8> {
    [header_b64.as_bytes(), b".", signing_input].concat()
}

#[async_trait]
impl SignatureSuite for JwsSuite {
    fn proof_type(&self) -> &str {
        self.proof_type
    }

    fn supports(&self, key_type: KeyType) -> bool {
        self.key_types.contains(&key_type)
    }

    async fn sign(
        &self,
        key_manager: &dyn KeyManager,
        key_id: &str,
        key_type: KeyType,
        signing_input: &[u8],
    ) -> Result<String> {
        let header = json!({
            "alg": alg(key_type),
            "b64": false,
            "crit": ["b64"],
        });
        let header_b64 = serde_json::to_vec(&header)
            .map(|b| BASE64_URL_SAFE_NO_PAD.encode(b))
            .context("failed to serialize JWS header")?;

        let signature = key_manager
            .sign(key_id, &jws_payload(&header_b64, signing_input))
            .await?;
        let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(signature);

        Ok(format!("{header_b64}..{signature_b64}"))
    }

    fn verify(
        &self,
        key_type: KeyType,
        public_key: &[u8],
        signing_input: &[u8],
        jws: &str,
    ) -> anyhow::Result<bool> {
        let Some((header_b64, signature_b64)) = jws.split_once("..") else {
            bail!("jws is not a detached JWS")
        };

        let header_json_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(header_b64)
            .context("jws header was not valid base64url")?;
        let header = serde_json::from_slice::<Map<String, Value>>(&header_json_bytes)
            .context("jws header was not valid json")?;

        let Some(Value::String(header_alg)) = header.get("alg") else {
            bail!("'alg' was missing from jws header")
        };
        if header_alg != alg(key_type) {
            bail!("jws algorithm {header_alg} does not match a {key_type} key")
        }

        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .context("jws signature was not valid base64url")?;

        keys::verify(
            key_type,
            public_key,
            &jws_payload(header_b64, signing_input),
            &signature,
        )
    }
}
