use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::proof::{CREDENTIALS_V1_CONTEXT, VERIFIABLE_PRESENTATION_TYPE};

/// Builds unsigned linked data verifiable presentations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiablePresentationBuilder(Map<String, Value>);

impl From<VerifiablePresentationBuilder> for Value {
    fn from(builder: VerifiablePresentationBuilder) -> Self {
        Value::Object(builder.0)
    }
}

impl Default for VerifiablePresentationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifiablePresentationBuilder {
    /// Returns a presentation with the credentials context and type, and no
    /// credentials.
    pub fn new() -> Self {
        let mut presentation = Map::new();
        presentation.insert("@context".into(), json!([CREDENTIALS_V1_CONTEXT]));
        presentation.insert("type".into(), json!([VERIFIABLE_PRESENTATION_TYPE]));
        presentation.insert("verifiableCredential".into(), Value::Array(Vec::new()));
        Self(presentation)
    }

    /// Start from an existing presentation, keeping the credentials it
    /// already embeds. Its proofs are dropped since the presentation is
    /// re-signed.
    pub fn from_presentation(presentation: Value) -> Self {
        let mut builder = Self::new();
        if let Value::Object(mut presentation) = presentation {
            presentation.remove("proof");
            let credentials = match presentation.remove("verifiableCredential") {
                Some(Value::Array(credentials)) => credentials,
                Some(Value::Null) | None => Vec::new(),
                Some(credential) => vec![credential],
            };
            builder.0.extend(presentation);
            builder
                .0
                .insert("verifiableCredential".into(), Value::Array(credentials));
        }
        builder
    }

    /// Set the holder of the presentation.
    ///
    /// The holder is the DID whose key signs the presentation.
    pub fn set_holder(mut self, holder: String) -> Self {
        self.0.insert("holder".into(), Value::String(holder));
        self
    }

    /// Add a verifiable credential to the presentation.
    pub fn add_verifiable_credential(mut self, credential: Value) -> Self {
        if let Some(Value::Array(credentials)) = self.0.get_mut("verifiableCredential") {
            credentials.push(credential);
        }
        self
    }

    /// Add a presentation submission, as produced by presentation exchange.
    pub fn set_presentation_submission(mut self, submission: Value) -> Self {
        self.0.insert("presentation_submission".into(), submission);
        if let Some(Value::Array(contexts)) = self.0.get_mut("@context") {
            let context = Value::String(PRESENTATION_SUBMISSION_CONTEXT.into());
            if !contexts.contains(&context) {
                contexts.push(context);
            }
        }
        if let Some(Value::Array(types)) = self.0.get_mut("type") {
            types.push(Value::String(PRESENTATION_SUBMISSION_TYPE.into()));
        }
        self
    }

    pub fn build(self) -> Value {
        self.into()
    }
}

const PRESENTATION_SUBMISSION_CONTEXT: &str =
    "https://identity.foundation/presentation-exchange/submission/v1";
const PRESENTATION_SUBMISSION_TYPE: &str = "PresentationSubmission";
