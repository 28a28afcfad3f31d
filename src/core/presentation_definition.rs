use super::input_descriptor::*;
use super::presentation_submission::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A presentation definition is a JSON object that describes the information a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// > Presentation Definitions are objects that articulate what proofs a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
}

/// Credentials selected for a presentation definition.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedCredentials {
    /// Matched credentials, each listed once.
    pub credentials: Vec<Value>,
    /// Submission mapping every input descriptor to a credential index.
    pub submission: PresentationSubmission,
}

impl PresentationDefinition {
    /// The Presentation Definition MUST contain an id property. The value of this property MUST be a string.
    ///
    /// The Presentation Definition MUST contain an input_descriptors property. Its value MUST be an array of Input Descriptor Objects,
    /// the composition of which are found [InputDescriptor] type.
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    /// Return the id of the presentation definition.
    pub fn id(&self) -> &String {
        &self.id
    }

    /// Add a new input descriptor to the presentation definition.
    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    /// Return the input descriptors of the presentation definition.
    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn set_purpose(mut self, purpose: String) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Return the human-readable string representation of the fields requested
    /// in the presentation definition's input descriptors.
    ///
    /// `$.credentialSubject.givenName` -> Given Name
    pub fn requested_fields(&self) -> Vec<String> {
        self.input_descriptors
            .iter()
            .flat_map(InputDescriptor::requested_fields)
            .collect()
    }

    /// Select credentials satisfying every input descriptor.
    ///
    /// Returns `None` if any input descriptor is left unsatisfied. Each input
    /// descriptor is mapped to every matching credential, and a credential
    /// matching several descriptors is included once.
    pub fn select(&self, credentials: &[Value]) -> Result<Option<SelectedCredentials>> {
        self.select_where(credentials, |_, _| true)
    }

    /// Like [PresentationDefinition::select], considering for each input
    /// descriptor only the credentials accepted by `eligible`.
    pub fn select_where<F>(
        &self,
        credentials: &[Value],
        eligible: F,
    ) -> Result<Option<SelectedCredentials>>
    where
        F: Fn(&InputDescriptor, &Value) -> bool,
    {
        let mut selected: Vec<usize> = Vec::new();
        let mut descriptor_map = Vec::new();

        for descriptor in &self.input_descriptors {
            let mut matched = false;
            for (index, credential) in credentials.iter().enumerate() {
                if !eligible(descriptor, credential) || !descriptor.matches(credential)? {
                    continue;
                }
                matched = true;

                let position = match selected.iter().position(|i| *i == index) {
                    Some(position) => position,
                    None => {
                        selected.push(index);
                        selected.len() - 1
                    }
                };
                descriptor_map.push(DescriptorMap::new(
                    descriptor.id().to_owned(),
                    format!("$.verifiableCredential[{position}]"),
                ));
            }

            if !matched {
                debug!(
                    definition = %self.id,
                    descriptor = descriptor.id(),
                    "no credential satisfies input descriptor"
                );
                return Ok(None);
            }
        }

        Ok(Some(SelectedCredentials {
            credentials: selected
                .into_iter()
                .map(|index| credentials[index].clone())
                .collect(),
            submission: PresentationSubmission::new(
                uuid::Uuid::new_v4(),
                self.id.clone(),
                descriptor_map,
            ),
        }))
    }
}
