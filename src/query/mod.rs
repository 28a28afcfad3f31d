//! Credential queries.
//!
//! A wallet query is a list of [QuerySpec]s, each producing a presentation
//! of the stored credentials it matches.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    content::{ContentStore, ContentType},
    core::{
        input_descriptor::ConstraintsLimitDisclosure,
        presentation_definition::{PresentationDefinition, SelectedCredentials},
    },
    credential::{
        presentation::VerifiablePresentationBuilder,
        proof::{proof_type, proofs, BBS_SIGNATURE_2020},
        CredentialOps,
    },
    error::{Result, WalletError},
};

mod example;

pub use example::{QueryByExample, QueryByFrame, TrustedIssuer};

/// Supported query types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    PresentationExchange,
    QueryByExample,
    QueryByFrame,
    DidAuth,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::PresentationExchange => "PresentationExchange",
            QueryType::QueryByExample => "QueryByExample",
            QueryType::QueryByFrame => "QueryByFrame",
            QueryType::DidAuth => "DIDAuth",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        [
            QueryType::PresentationExchange,
            QueryType::QueryByExample,
            QueryType::QueryByFrame,
            QueryType::DidAuth,
        ]
        .into_iter()
        .find(|query_type| query_type.as_str() == s)
        .ok_or_else(|| WalletError::UnsupportedQueryType(s.to_owned()))
    }
}

/// One query: a type and its query documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(rename = "type")]
    pub query_type: String,
    #[serde(default, rename = "credentialQuery", alias = "query")]
    pub credential_query: Vec<Value>,
}

impl QuerySpec {
    pub fn new(query_type: impl Into<String>, credential_query: Vec<Value>) -> Self {
        Self {
            query_type: query_type.into(),
            credential_query,
        }
    }
}

/// Evaluates queries against every credential stored in a wallet.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    content: ContentStore,
    credentials: CredentialOps,
}

fn invalid_query(query_type: QueryType, e: impl fmt::Display) -> WalletError {
    WalletError::InvalidContent(format!("invalid {query_type} query: {e}"))
}

fn has_selective_disclosure_proof(credential: &Value) -> bool {
    proofs(credential)
        .into_iter()
        .any(|proof| proof_type(proof) == Some(BBS_SIGNATURE_2020))
}

impl QueryEngine {
    pub fn new(content: ContentStore, credentials: CredentialOps) -> Self {
        Self {
            content,
            credentials,
        }
    }

    /// Run `specs`, returning one presentation per spec that matched at
    /// least one credential. Presentations are not signed.
    ///
    /// Every spec type is checked before any is evaluated.
    pub async fn query(&self, specs: &[QuerySpec]) -> Result<Vec<Value>> {
        if specs.is_empty() {
            return Err(WalletError::NoResultFound);
        }
        let query_types = specs
            .iter()
            .map(|spec| spec.query_type.parse::<QueryType>())
            .collect::<Result<Vec<_>>>()?;

        let credentials: Vec<Value> = self
            .content
            .get_all_json(ContentType::Credential)
            .await?
            .into_iter()
            .map(|(_, credential)| credential)
            .collect();

        let mut results = Vec::new();
        for (query_type, spec) in query_types.into_iter().zip(specs) {
            let result = match query_type {
                QueryType::PresentationExchange => {
                    self.presentation_exchange(spec, &credentials).await?
                }
                QueryType::QueryByExample => query_by_example(spec, &credentials)?,
                QueryType::QueryByFrame => self.query_by_frame(spec, &credentials).await?,
                QueryType::DidAuth => Some(VerifiablePresentationBuilder::new().build()),
            };

            match result {
                Some(presentation) => results.push(presentation),
                None => debug!(%query_type, "query matched no credentials"),
            }
        }

        Ok(results)
    }

    async fn presentation_exchange(
        &self,
        spec: &QuerySpec,
        credentials: &[Value],
    ) -> Result<Option<Value>> {
        let query_type = QueryType::PresentationExchange;
        let [definition] = spec.credential_query.as_slice() else {
            return Err(invalid_query(
                query_type,
                "exactly one presentation definition is required",
            ));
        };
        let definition: PresentationDefinition = serde_json::from_value(definition.clone())
            .map_err(|e| invalid_query(query_type, e))?;

        let selected = definition
            .select_where(credentials, |descriptor, credential| {
                match descriptor.constraints().limit_disclosure() {
                    Some(ConstraintsLimitDisclosure::Required) => {
                        has_selective_disclosure_proof(credential)
                    }
                    _ => true,
                }
            })
            .map_err(|e| invalid_query(query_type, format!("{e:#}")))?;
        let Some(SelectedCredentials {
            mut credentials,
            submission,
        }) = selected
        else {
            return Ok(None);
        };

        let descriptors = submission.descriptor_map_by_id();
        for descriptor in definition.input_descriptors() {
            if descriptor.constraints().limit_disclosure()
                != Some(&ConstraintsLimitDisclosure::Required)
            {
                continue;
            }
            let Some(mapped) = descriptors.get(descriptor.id()) else {
                continue;
            };
            let Some(index) = credential_index(mapped.path()) else {
                continue;
            };
            let Some(credential) = credentials.get_mut(index) else {
                continue;
            };
            // A credential mapped to several descriptors is only derived once.
            if !has_selective_disclosure_proof(credential) {
                continue;
            }

            *credential = self
                .credentials
                .derive_credential(
                    credential,
                    &descriptor.constraints().disclosure_frame(),
                    Uuid::new_v4().to_string().as_bytes(),
                )
                .await?;
        }

        let presentation = credentials
            .into_iter()
            .fold(
                VerifiablePresentationBuilder::new(),
                VerifiablePresentationBuilder::add_verifiable_credential,
            )
            .set_presentation_submission(submission.into())
            .build();
        Ok(Some(presentation))
    }

    async fn query_by_frame(&self, spec: &QuerySpec, credentials: &[Value]) -> Result<Option<Value>> {
        let mut matched = Vec::new();
        for query in &spec.credential_query {
            let query: QueryByFrame = serde_json::from_value(query.clone())
                .map_err(|e| invalid_query(QueryType::QueryByFrame, e))?;

            for credential in credentials.iter().filter(|c| query.matches(c)) {
                let nonce = Uuid::new_v4().to_string();
                match self
                    .credentials
                    .derive_credential(credential, &query.frame, nonce.as_bytes())
                    .await
                {
                    Ok(derived) => matched.push(derived),
                    Err(e) => {
                        let id = credential.get("id").and_then(Value::as_str);
                        warn!(id, "skipping credential that could not be derived: {e}")
                    }
                }
            }
        }
        Ok(presentation_of(matched))
    }
}

fn query_by_example(spec: &QuerySpec, credentials: &[Value]) -> Result<Option<Value>> {
    let mut matched: Vec<Value> = Vec::new();
    for query in &spec.credential_query {
        let query: QueryByExample = serde_json::from_value(query.clone())
            .map_err(|e| invalid_query(QueryType::QueryByExample, e))?;

        for credential in credentials.iter().filter(|c| query.matches(c)) {
            if !matched.contains(credential) {
                matched.push(credential.clone());
            }
        }
    }
    Ok(presentation_of(matched))
}

fn presentation_of(credentials: Vec<Value>) -> Option<Value> {
    if credentials.is_empty() {
        return None;
    }
    Some(
        credentials
            .into_iter()
            .fold(
                VerifiablePresentationBuilder::new(),
                VerifiablePresentationBuilder::add_verifiable_credential,
            )
            .build(),
    )
}

/// Index of `$.verifiableCredential[i]`.
fn credential_index(path: &str) -> Option<usize> {
    path.strip_prefix("$.verifiableCredential[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_type_names() {
        assert_eq!("DIDAuth".parse::<QueryType>().unwrap(), QueryType::DidAuth);
        assert!(matches!(
            "invalid".parse::<QueryType>(),
            Err(WalletError::UnsupportedQueryType(_))
        ));
    }

    #[test]
    fn spec_json() {
        let spec: QuerySpec = serde_json::from_value(serde_json::json!({
            "type": "QueryByExample",
            "credentialQuery": [{"example": {"type": "UniversityDegreeCredential"}}]
        }))
        .unwrap();
        assert_eq!(spec.query_type, "QueryByExample");
        assert_eq!(spec.credential_query.len(), 1);

        let did_auth: QuerySpec =
            serde_json::from_value(serde_json::json!({"type": "DIDAuth"})).unwrap();
        assert!(did_auth.credential_query.is_empty());
    }

    #[test]
    fn submission_paths() {
        assert_eq!(credential_index("$.verifiableCredential[3]"), Some(3));
        assert_eq!(credential_index("$.vc"), None);
    }
}
