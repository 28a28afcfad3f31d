//! Helpers for reading and writing linked data proofs on JSON documents.

use serde_json::{Map, Value};

use crate::{
    error::{Result, WalletError},
    utils::{canonical_json, string_or_array},
};

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";
pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";
pub const BBS_SIGNATURE_2020: &str = "BbsBlsSignature2020";
pub const BBS_SIGNATURE_PROOF_2020: &str = "BbsBlsSignatureProof2020";

const PROOF: &str = "proof";

/// Proofs attached to a document. `proof` may be a single object or a list.
pub fn proofs(document: &Value) -> Vec<&Value> {
    match document.get(PROOF) {
        Some(Value::Array(proofs)) => proofs.iter().collect(),
        Some(proof @ Value::Object(_)) => vec![proof],
        _ => Vec::new(),
    }
}

pub fn proof_type(proof: &Value) -> Option<&str> {
    proof.get("type").and_then(Value::as_str)
}

/// A copy of `document` without its proofs.
pub fn without_proof(document: &Value) -> Value {
    let mut document = document.clone();
    if let Some(object) = document.as_object_mut() {
        object.remove(PROOF);
    }
    document
}

/// Append `proof`, turning a single existing proof into a list.
pub fn add_proof(document: &mut Value, proof: Value) -> Result<()> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| WalletError::InvalidContent("document is not a JSON object".into()))?;

    match object.remove(PROOF) {
        None => {
            object.insert(PROOF.into(), proof);
        }
        Some(Value::Array(mut proofs)) => {
            proofs.push(proof);
            object.insert(PROOF.into(), Value::Array(proofs));
        }
        Some(existing) => {
            object.insert(PROOF.into(), Value::Array(vec![existing, proof]));
        }
    }
    Ok(())
}

/// Bytes signed by a linked data proof: the unsigned document followed by the
/// proof configuration, each serialized with sorted keys.
pub fn signing_input(document: &Value, proof: &Map<String, Value>) -> Vec<u8> {
    let mut config = proof.clone();
    config.remove("jws");
    config.remove("proofValue");

    let mut input = canonical_json(&without_proof(document));
    input.extend(canonical_json(&Value::Object(config)));
    input
}

pub fn has_type(document: &Value, expected: &str) -> bool {
    string_or_array(document.get("type")).contains(&expected)
}

/// Parse and check a verifiable credential.
pub fn parse_credential(bytes: &[u8]) -> Result<Value> {
    let credential: Value = serde_json::from_slice(bytes)
        .map_err(|e| WalletError::UnknownCredentialStructure(e.to_string()))?;
    check_credential(&credential)?;
    Ok(credential)
}

/// Fail with [WalletError::UnknownCredentialStructure] unless `credential`
/// is a JSON object typed as a verifiable credential.
pub fn check_credential(credential: &Value) -> Result<()> {
    if !credential.is_object() {
        return Err(WalletError::UnknownCredentialStructure(
            "credential is not a JSON object".into(),
        ));
    }
    if !has_type(credential, VERIFIABLE_CREDENTIAL_TYPE) {
        return Err(WalletError::UnknownCredentialStructure(format!(
            "credential type must include {VERIFIABLE_CREDENTIAL_TYPE}"
        )));
    }
    Ok(())
}

/// Parse and check a verifiable presentation.
pub fn parse_presentation(bytes: &[u8]) -> Result<Value> {
    let presentation: Value = serde_json::from_slice(bytes)
        .map_err(|e| WalletError::InvalidContent(format!("presentation is not valid JSON: {e}")))?;
    if !has_type(&presentation, VERIFIABLE_PRESENTATION_TYPE) {
        return Err(WalletError::InvalidContent(format!(
            "presentation type must include {VERIFIABLE_PRESENTATION_TYPE}"
        )));
    }
    Ok(presentation)
}

/// The DID expected to control a document's proofs: the holder of a
/// presentation, or the issuer of a credential.
pub fn expected_signer(document: &Value) -> Option<&str> {
    if has_type(document, VERIFIABLE_PRESENTATION_TYPE) {
        return document.get("holder").and_then(Value::as_str);
    }
    match document.get("issuer")? {
        Value::String(issuer) => Some(issuer),
        issuer => issuer.get("id").and_then(Value::as_str),
    }
}

/// Credentials embedded in a presentation.
pub fn embedded_credentials(presentation: &Value) -> Vec<&Value> {
    match presentation.get("verifiableCredential") {
        Some(Value::Array(credentials)) => credentials.iter().collect(),
        Some(credential) if !credential.is_null() => vec![credential],
        _ => Vec::new(),
    }
}
