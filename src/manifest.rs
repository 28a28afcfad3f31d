//! Credential manifest display resolution.
//!
//! Issuers describe how their credentials should be displayed with the
//! output descriptors of a credential manifest. Resolving a manifest against
//! a credential fills in those display mappings with the credential's data.
//!
//! See: [https://identity.foundation/credential-manifest/](https://identity.foundation/credential-manifest/)

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

use crate::{
    content::{ContentStore, ContentType},
    core::presentation_submission::DescriptorMap,
    credential::proof::parse_credential,
    error::{Result, WalletError},
};

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialManifest {
    pub id: String,
    #[serde(default)]
    pub output_descriptors: Vec<OutputDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputDescriptor {
    pub id: String,
    #[serde(default)]
    pub display: Option<DataDisplay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataDisplay {
    pub title: Option<DisplayMapping>,
    pub subtitle: Option<DisplayMapping>,
    pub description: Option<DisplayMapping>,
    #[serde(default)]
    pub properties: Vec<LabeledDisplayMapping>,
}

/// Either constant `text`, or the first value found at `path`, falling back
/// to `fallback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisplayMapping {
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub fallback: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabeledDisplayMapping {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub mapping: DisplayMapping,
}

impl DisplayMapping {
    fn resolve(&self, credential: &Value) -> Result<Option<Value>> {
        if let Some(text) = &self.text {
            return Ok(Some(Value::String(text.clone())));
        }

        for path in &self.path {
            let path = JsonPath::parse(path)
                .with_context(|| format!("invalid display mapping path `{path}`"))?;
            if let Some(value) = path.query(credential).all().first() {
                return Ok(Some((*value).clone()));
            }
        }
        Ok(self.fallback.clone())
    }

    fn resolve_string(&self, credential: &Value) -> Result<Option<String>> {
        Ok(self.resolve(credential)?.map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        }))
    }
}

/// Where the credentials to resolve come from.
#[derive(Debug, Clone)]
pub enum ResolveManifestSource {
    /// A credential response carrying `credential_response.descriptor_map`
    /// over its `verifiableCredential` list.
    RawResponse(Vec<u8>),
    /// A single credential and the output descriptor it was issued for.
    RawCredential {
        credential: Vec<u8>,
        descriptor_id: String,
    },
    StoredCredential {
        id: String,
        descriptor_id: String,
    },
}

/// An output descriptor resolved against a credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDescriptor {
    pub descriptor_id: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub properties: Vec<ResolvedProperty>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedProperty {
    pub label: Option<String>,
    pub value: Value,
    pub schema: Value,
}

#[derive(Deserialize)]
struct CredentialResponse {
    credential_response: ResponseDescriptors,
}

#[derive(Deserialize)]
struct ResponseDescriptors {
    #[serde(default)]
    descriptor_map: Vec<DescriptorMap>,
}

impl CredentialManifest {
    fn output_descriptor(&self, id: &str) -> Result<&OutputDescriptor> {
        self.output_descriptors
            .iter()
            .find(|descriptor| descriptor.id == id)
            .ok_or_else(|| {
                WalletError::InvalidContent(format!(
                    "output descriptor `{id}` not found in manifest `{}`",
                    self.id
                ))
            })
    }
}

impl OutputDescriptor {
    /// Resolve this descriptor's display against `credential`.
    pub fn resolve(&self, credential: &Value) -> Result<ResolvedDescriptor> {
        let display = self.display.clone().unwrap_or_default();
        let resolve = |mapping: &Option<DisplayMapping>| match mapping {
            Some(mapping) => mapping.resolve_string(credential),
            None => Ok(None),
        };

        let mut properties = Vec::new();
        for property in &display.properties {
            match property.mapping.resolve(credential)? {
                Some(value) => properties.push(ResolvedProperty {
                    label: property.label.clone(),
                    value,
                    schema: property.mapping.schema.clone(),
                }),
                None => debug!(
                    descriptor = %self.id,
                    label = property.label.as_deref(),
                    "skipping property without value"
                ),
            }
        }

        Ok(ResolvedDescriptor {
            descriptor_id: self.id.clone(),
            title: resolve(&display.title)?,
            subtitle: resolve(&display.subtitle)?,
            description: resolve(&display.description)?,
            properties,
        })
    }
}

/// Resolves credential manifests for credentials from the wallet or the
/// caller.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    content: ContentStore,
}

impl ManifestResolver {
    pub fn new(content: ContentStore) -> Self {
        Self { content }
    }

    /// Resolve `manifest`, returning one descriptor per resolved credential.
    pub async fn resolve(
        &self,
        manifest: &[u8],
        source: ResolveManifestSource,
    ) -> Result<Vec<ResolvedDescriptor>> {
        let manifest: CredentialManifest = serde_json::from_slice(manifest)
            .map_err(|e| WalletError::InvalidContent(format!("invalid credential manifest: {e}")))?;

        match source {
            ResolveManifestSource::RawResponse(raw) => resolve_response(&manifest, &raw),
            ResolveManifestSource::RawCredential {
                credential,
                descriptor_id,
            } => {
                let credential = parse_credential(&credential)?;
                Ok(vec![manifest
                    .output_descriptor(&descriptor_id)?
                    .resolve(&credential)?])
            }
            ResolveManifestSource::StoredCredential { id, descriptor_id } => {
                let credential = self.content.get(ContentType::Credential, &id).await?;
                let credential = parse_credential(&credential)?;
                Ok(vec![manifest
                    .output_descriptor(&descriptor_id)?
                    .resolve(&credential)?])
            }
        }
    }
}

fn resolve_response(manifest: &CredentialManifest, raw: &[u8]) -> Result<Vec<ResolvedDescriptor>> {
    let document: Value = serde_json::from_slice(raw)
        .map_err(|e| WalletError::InvalidContent(format!("invalid credential response: {e}")))?;
    let response: CredentialResponse = serde_json::from_value(document.clone())
        .map_err(|e| WalletError::InvalidContent(format!("invalid credential response: {e}")))?;

    response
        .credential_response
        .descriptor_map
        .iter()
        .map(|mapped| {
            let path = JsonPath::parse(mapped.path())
                .with_context(|| format!("invalid descriptor map path `{}`", mapped.path()))?;
            let credential = path.query(&document).exactly_one().map_err(|_| {
                WalletError::InvalidContent(format!(
                    "no credential found at `{}` for descriptor `{}`",
                    mapped.path(),
                    mapped.id()
                ))
            })?;
            manifest.output_descriptor(mapped.id())?.resolve(credential)
        })
        .collect()
}
