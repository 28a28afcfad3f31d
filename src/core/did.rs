use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    content::{ContentStore, ContentType},
    error::WalletError,
    kms::{keys::public_key_from_jwk, KeyType},
};

/// Resolves DIDs to DID documents, e.g. a VDR registry.
#[async_trait]
pub trait DidResolver: Debug + Send + Sync {
    /// Resolve `did`, returning `None` if the DID is unknown.
    async fn resolve(&self, did: &str) -> Result<Option<DidDocument>>;
}

/// The subset of a DID document used for signing and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<VerificationRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<VerificationRelationship>,
}

/// A verification relationship entry: either a reference to a method listed
/// in `verificationMethod` or an embedded method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerificationRelationship {
    Reference(String),
    Embedded(VerificationMethod),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<Value>,
}

impl VerificationMethod {
    /// Raw public key of this method.
    pub fn public_key(&self) -> Result<(KeyType, Vec<u8>)> {
        let jwk = self
            .public_key_jwk
            .as_ref()
            .with_context(|| format!("verification method `{}` has no publicKeyJwk", self.id))?;
        public_key_from_jwk(jwk)
            .with_context(|| format!("verification method `{}` has an invalid key", self.id))
    }
}

/// Proof purposes, mapped to DID document verification relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofPurpose {
    AssertionMethod,
    Authentication,
}

impl ProofPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofPurpose::AssertionMethod => "assertionMethod",
            ProofPurpose::Authentication => "authentication",
        }
    }
}

impl std::str::FromStr for ProofPurpose {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assertionMethod" => Ok(ProofPurpose::AssertionMethod),
            "authentication" => Ok(ProofPurpose::Authentication),
            _ => anyhow::bail!("unsupported proof purpose `{s}`"),
        }
    }
}

/// The DID part of a DID URL.
pub fn did_from_url(did_url: &str) -> &str {
    did_url.split_once('#').map_or(did_url, |(did, _)| did)
}

impl DidDocument {
    /// Expand a relative DID URL (`#key-1`) against this document's id.
    pub fn absolute_id<'a>(&self, id: &'a str) -> std::borrow::Cow<'a, str> {
        if id.starts_with('#') {
            format!("{}{id}", self.id).into()
        } else {
            id.into()
        }
    }

    fn resolve_relationship<'a>(
        &'a self,
        relationship: &'a VerificationRelationship,
    ) -> Option<&'a VerificationMethod> {
        match relationship {
            VerificationRelationship::Embedded(method) => Some(method),
            VerificationRelationship::Reference(id) => self.verification_method(id),
        }
    }

    /// Find a verification method by absolute or relative id.
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        let id = self.absolute_id(id);
        let embedded = self
            .assertion_method
            .iter()
            .chain(&self.authentication)
            .filter_map(|relationship| match relationship {
                VerificationRelationship::Embedded(method) => Some(method),
                VerificationRelationship::Reference(_) => None,
            });

        self.verification_method
            .iter()
            .chain(embedded)
            .find(|method| self.absolute_id(&method.id) == id)
    }

    fn relationships(&self, purpose: ProofPurpose) -> &[VerificationRelationship] {
        match purpose {
            ProofPurpose::AssertionMethod => &self.assertion_method,
            ProofPurpose::Authentication => &self.authentication,
        }
    }

    /// The first method listed for `purpose`.
    pub fn method_for(&self, purpose: ProofPurpose) -> Option<&VerificationMethod> {
        self.relationships(purpose)
            .iter()
            .find_map(|relationship| self.resolve_relationship(relationship))
    }

    /// Whether `method` is listed under the relationship for `purpose`.
    pub fn authorizes(&self, method: &VerificationMethod, purpose: ProofPurpose) -> bool {
        let id = self.absolute_id(&method.id);
        self.relationships(purpose)
            .iter()
            .filter_map(|relationship| self.resolve_relationship(relationship))
            .any(|listed| self.absolute_id(&listed.id) == id)
    }
}

/// Resolves DIDs from the wallet's stored DID resolution responses first,
/// then from the configured VDR.
#[derive(Debug, Clone)]
pub struct WalletDidResolver {
    content: ContentStore,
    vdr: Option<Arc<dyn DidResolver>>,
}

impl WalletDidResolver {
    pub fn new(content: ContentStore, vdr: Option<Arc<dyn DidResolver>>) -> Self {
        Self { content, vdr }
    }

    pub async fn resolve(&self, did: &str) -> crate::error::Result<DidDocument> {
        match self
            .content
            .get_json(ContentType::DidResolutionResponse, did)
            .await
        {
            Ok(response) => {
                let document = response
                    .get("didDocument")
                    .cloned()
                    .context("stored DID resolution response has no didDocument")?;
                return Ok(serde_json::from_value(document)
                    .context("stored DID document is invalid")?);
            }
            Err(WalletError::ContentNotFound { .. }) => {
                debug!(did, "DID not stored in wallet, resolving through VDR")
            }
            Err(e) => return Err(e),
        }

        let vdr = self.vdr.as_ref().ok_or(WalletError::ServiceUnavailable("VDR"))?;
        vdr.resolve(did)
            .await
            .with_context(|| format!("failed to resolve DID `{did}`"))?
            .ok_or_else(|| anyhow::anyhow!("DID `{did}` not found").into())
    }
}
