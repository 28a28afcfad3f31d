//! Query by example and query by frame matching.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    credential::proof::{proof_type, proofs, BBS_SIGNATURE_2020},
    utils::string_or_array,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedIssuer {
    pub issuer: String,
    #[serde(default)]
    pub required: bool,
}

/// Credentials from issuers other than the required trusted issuers never
/// match. Issuers that are trusted but not required do not restrict matches.
fn issued_by_trusted(credential: &Value, trusted: &[TrustedIssuer]) -> bool {
    let required: Vec<&str> = trusted
        .iter()
        .filter(|t| t.required)
        .map(|t| t.issuer.as_str())
        .collect();
    if required.is_empty() {
        return true;
    }

    let issuer = match credential.get("issuer") {
        Some(Value::String(issuer)) => Some(issuer.as_str()),
        Some(issuer) => issuer.get("id").and_then(Value::as_str),
        None => None,
    };
    issuer.is_some_and(|issuer| required.contains(&issuer))
}

fn includes_all(credential: &Value, example: &Value, property: &str) -> bool {
    let have = string_or_array(credential.get(property));
    string_or_array(example.get(property))
        .iter()
        .all(|wanted| have.contains(wanted))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryByExample {
    pub example: Example,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    #[serde(default, rename = "@context")]
    pub context: Value,
    #[serde(default, rename = "type")]
    pub types: Value,
    #[serde(default)]
    pub credential_subject: Option<Value>,
    #[serde(default)]
    pub credential_schema: Option<Value>,
    #[serde(default)]
    pub trusted_issuer: Vec<TrustedIssuer>,
}

impl QueryByExample {
    pub fn matches(&self, credential: &Value) -> bool {
        let example = &self.example;
        let wanted = serde_json::json!({
            "@context": example.context,
            "type": example.types,
        });

        if !includes_all(credential, &wanted, "@context") || !includes_all(credential, &wanted, "type")
        {
            return false;
        }

        if let Some(subject_id) = example
            .credential_subject
            .as_ref()
            .and_then(|subject| subject.get("id"))
            .and_then(Value::as_str)
        {
            let subjects = match credential.get("credentialSubject") {
                Some(Value::Array(subjects)) => subjects.iter().collect(),
                Some(subject) => vec![subject],
                None => Vec::new(),
            };
            if !subjects
                .iter()
                .any(|subject| subject.get("id").and_then(Value::as_str) == Some(subject_id))
            {
                return false;
            }
        }

        if let Some(schema_id) = example
            .credential_schema
            .as_ref()
            .and_then(|schema| schema.get("id"))
            .and_then(Value::as_str)
        {
            let schemas = match credential.get("credentialSchema") {
                Some(Value::Array(schemas)) => schemas.iter().collect(),
                Some(schema) => vec![schema],
                None => Vec::new(),
            };
            if !schemas
                .iter()
                .any(|schema| schema.get("id").and_then(Value::as_str) == Some(schema_id))
            {
                return false;
            }
        }

        issued_by_trusted(credential, &example.trusted_issuer)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryByFrame {
    pub frame: Value,
    #[serde(default)]
    pub trusted_issuer: Vec<TrustedIssuer>,
}

impl QueryByFrame {
    /// Credentials matching a frame must be derivable: they carry every type
    /// of the frame and a `BbsBlsSignature2020` proof.
    pub fn matches(&self, credential: &Value) -> bool {
        includes_all(credential, &self.frame, "type")
            && proofs(credential)
                .into_iter()
                .any(|proof| proof_type(proof) == Some(BBS_SIGNATURE_2020))
            && issued_by_trusted(credential, &self.trusted_issuer)
    }
}
