use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Claim format of every credential the wallet submits.
pub const LDP_VC: &str = "ldp_vc";

/// Presentation Submissions are objects embedded within target
/// [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim) negotiation
/// formats that express how the inputs presented as proofs to a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) are
/// provided in accordance with the requirements specified in a
/// [PresentationDefinition](super::presentation_definition::PresentationDefinition).
///
/// Embedded Presentation Submission objects MUST be located within target data format as
/// the value of a `presentation_submission` property.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: uuid::Uuid,
    definition_id: DescriptorMapId,
    descriptor_map: Vec<DescriptorMap>,
}

impl PresentationSubmission {
    /// The presentation submission object MUST contain a `definition_id` property.
    /// The value of this property MUST be the id value of a valid presentation definition.
    pub fn new(
        id: uuid::Uuid,
        definition_id: DescriptorMapId,
        descriptor_map: Vec<DescriptorMap>,
    ) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    /// Return the id of the presentation submission.
    pub fn id(&self) -> &uuid::Uuid {
        &self.id
    }

    /// Return the definition id of the presentation submission.
    pub fn definition_id(&self) -> &String {
        &self.definition_id
    }

    /// Return the descriptor map of the presentation submission.
    pub fn descriptor_map(&self) -> &Vec<DescriptorMap> {
        &self.descriptor_map
    }

    /// Returns the descriptor map as a mapping of descriptor map id to descriptor map.
    pub fn descriptor_map_by_id(
        &self,
    ) -> std::collections::HashMap<DescriptorMapId, &DescriptorMap> {
        self.descriptor_map
            .iter()
            .map(|descriptor_map| (descriptor_map.id.clone(), descriptor_map))
            .collect()
    }
}

impl From<PresentationSubmission> for Json {
    fn from(value: PresentationSubmission) -> Self {
        serde_json::json!({
            "id": value.id,
            "definition_id": value.definition_id,
            "descriptor_map": value.descriptor_map
                .into_iter()
                .map(Json::from)
                .collect::<Vec<_>>(),
        })
    }
}

/// Descriptor Maps are objects used to describe the information a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) provides to a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier).
///
/// The same shape is used by credential manifests to map output descriptors
/// into a credential response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    pub id: DescriptorMapId,
    pub format: String,
    pub path: String,
}

impl DescriptorMap {
    /// Map descriptor `id` to the `ldp_vc` input found at `path`.
    pub fn new(id: DescriptorMapId, path: String) -> Self {
        Self {
            id,
            format: LDP_VC.to_owned(),
            path,
        }
    }

    /// Return the id of the descriptor map.
    pub fn id(&self) -> &DescriptorMapId {
        &self.id
    }

    /// Return the path of the descriptor map.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl From<DescriptorMap> for Json {
    fn from(value: DescriptorMap) -> Self {
        serde_json::json!({
            "id": value.id,
            "format": value.format,
            "path": value.path,
        })
    }
}
