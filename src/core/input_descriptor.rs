use crate::utils::{string_or_array, to_human_readable_string, NonEmptyVec};

use anyhow::{bail, Context, Result};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A GroupId represents a unique identifier for a group of Input Descriptors.
pub type GroupId = String;

/// A JSONPath is a string that represents a path to a specific value within a JSON object.
///
/// For syntax details, see [https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition)
pub type JsonPath = String;

/// The predicate Feature introduces properties enabling Verifier to request that Holder apply a predicate and return the result.
///
/// See: [https://identity.foundation/presentation-exchange/#predicate-feature](https://identity.foundation/presentation-exchange/#predicate-feature)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    Required,
    Preferred,
}

/// Input Descriptors are objects used to describe the information a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// All Input Descriptors MUST be satisfied, unless otherwise specified by a
/// [Feature](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:feature).
///
/// Version 1 style `schema` entries are also honored: when present, a
/// credential must carry one of the listed URIs as a context or type, as a
/// `{context}#{type}` pair, or as a `credentialSchema` id.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default)]
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    schema: Vec<Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    group: Vec<GroupId>,
}

/// A version 1 input descriptor schema entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    pub uri: String,
    #[serde(default)]
    pub required: bool,
}

impl InputDescriptor {
    /// Create a new instance of the input descriptor with the given id and constraints.
    pub fn new(id: String, constraints: Constraints) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    /// Return the id of the input descriptor.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Return the constraints of the input descriptor.
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn set_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Add a version 1 schema requirement.
    pub fn add_schema(mut self, uri: String) -> Self {
        self.schema.push(Schema {
            uri,
            required: false,
        });
        self
    }

    fn matches_schema(&self, credential: &Value) -> bool {
        if self.schema.is_empty() {
            return true;
        }

        let contexts = string_or_array(credential.get("@context"));
        let types = string_or_array(credential.get("type"));

        // Every URI the credential answers to, including `{context}#{type}`.
        let mut uris: Vec<String> = contexts
            .iter()
            .chain(&types)
            .map(|uri| uri.to_string())
            .collect();
        for context in &contexts {
            uris.extend(types.iter().map(|t| format!("{context}#{t}")));
        }
        match credential.get("credentialSchema") {
            Some(Value::Array(schemas)) => uris.extend(
                schemas
                    .iter()
                    .filter_map(|s| s.get("id")?.as_str())
                    .map(str::to_owned),
            ),
            Some(schema) => uris.extend(schema.get("id").and_then(Value::as_str).map(str::to_owned)),
            None => {}
        }

        let listed = |schema: &Schema| uris.iter().any(|uri| *uri == schema.uri);
        let (required, optional): (Vec<&Schema>, Vec<&Schema>) =
            self.schema.iter().partition(|schema| schema.required);

        required.iter().all(|s| listed(*s))
            && (optional.is_empty() || optional.iter().any(|s| listed(*s)))
    }

    /// Check whether `credential` satisfies this input descriptor.
    ///
    /// For each field, the JSONPath expressions are evaluated in order and the
    /// first one yielding a value accepted by the field's filter satisfies the
    /// field. Required fields must be satisfied. Optional fields never
    /// disqualify a credential.
    pub fn matches(&self, credential: &Value) -> Result<bool> {
        if !self.matches_schema(credential) {
            return Ok(false);
        }

        if let Some(ConstraintsLimitDisclosure::Required) = self.constraints.limit_disclosure {
            if self.constraints.fields().is_empty() {
                bail!("Required limit disclosure must have fields.")
            }
        }

        for constraint_field in self.constraints.fields.iter() {
            if let Some(Predicate::Required) = constraint_field.predicate() {
                if constraint_field.filter().is_none() {
                    bail!("Required predicate must have a filter.")
                }
            }

            let satisfied = constraint_field.is_satisfied_by(credential)?;
            if !satisfied && constraint_field.is_required() {
                tracing::debug!(
                    descriptor = %self.id,
                    "credential does not satisfy field {:?}",
                    constraint_field.path().as_ref()
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Return the humanly readable requested fields of the input descriptor.
    pub fn requested_fields(&self) -> Vec<String> {
        self.constraints()
            .fields()
            .iter()
            .flat_map(|field| field.requested_fields_human_readable())
            .collect()
    }
}

/// Constraints are objects used to describe the constraints that a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) must satisfy to fulfill an Input Descriptor.
///
/// A constraint object MAY be empty, or it may include a `fields` and/or `limit_disclosure` property.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<ConstraintsLimitDisclosure>,
}

impl Constraints {
    /// Returns an empty Constraints object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new field constraint to the constraints list.
    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the fields of the constraints object.
    pub fn fields(&self) -> &Vec<ConstraintsField> {
        self.fields.as_ref()
    }

    /// Set the limit disclosure value.
    ///
    /// For more information: see [https://identity.foundation/presentation-exchange/spec/v2.0.0/#limited-disclosure-submissions](https://identity.foundation/presentation-exchange/spec/v2.0.0/#limited-disclosure-submissions)
    pub fn set_limit_disclosure(mut self, limit_disclosure: ConstraintsLimitDisclosure) -> Self {
        self.limit_disclosure = Some(limit_disclosure);
        self
    }

    /// Returns the limit disclosure value.
    pub fn limit_disclosure(&self) -> Option<&ConstraintsLimitDisclosure> {
        self.limit_disclosure.as_ref()
    }

    /// Returns if the constraints fields contain non-optional
    /// fields that must be satisfied.
    pub fn is_required(&self) -> bool {
        self.fields.iter().any(|field| field.is_required())
    }

    /// A frame revealing only the fields named by simple dotted paths, e.g.
    /// `$.credentialSubject.degree.type`.
    ///
    /// Paths with wildcards, filters or indexes cannot be expressed as a frame
    /// and are skipped.
    pub fn disclosure_frame(&self) -> Value {
        let mut frame = serde_json::Map::new();
        for path in self.fields.iter().flat_map(|field| field.path().iter()) {
            let Some(rest) = path.strip_prefix("$.") else {
                continue;
            };
            if rest.contains(['*', '[', '?', '(']) {
                continue;
            }

            let mut node = &mut frame;
            for segment in rest.split('.') {
                let entry = node
                    .entry(segment.to_owned())
                    .or_insert_with(|| Value::Object(Default::default()));
                if !entry.is_object() {
                    *entry = Value::Object(Default::default());
                }
                let Value::Object(next) = entry else {
                    break;
                };
                node = next;
            }
        }
        Value::Object(frame)
    }
}

/// ConstraintsField objects are used to describe the constraints that a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder)
/// must satisfy to fulfill an Input Descriptor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    path: NonEmptyVec<JsonPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    predicate: Option<Predicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
}

impl ConstraintsField {
    /// Create a new instance of the constraints field with the given path.
    pub fn new(path: JsonPath) -> ConstraintsField {
        ConstraintsField {
            path: NonEmptyVec::new(path),
            ..Default::default()
        }
    }

    /// Add a new path to the constraints field.
    pub fn add_path(mut self, path: JsonPath) -> Self {
        self.path.push(path);
        self
    }

    /// Return the paths of the constraints field.
    pub fn path(&self) -> &NonEmptyVec<JsonPath> {
        &self.path
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    /// Set the filter of the constraints field.
    ///
    /// If present its value MUST be a JSON Schema descriptor used to filter against
    /// the values returned from evaluation of the JSONPath string expressions in the path array.
    pub fn set_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Return the raw filter of the constraints field.
    pub fn filter(&self) -> Option<&Value> {
        self.filter.as_ref()
    }

    /// Return a JSON schema validator using the internal filter.
    pub fn validator(&self) -> Option<Result<JSONSchema>> {
        self.filter.as_ref().map(|filter| {
            JSONSchema::compile(filter).map_err(|e| anyhow::anyhow!("invalid filter: {e}"))
        })
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Inverse alias for `!is_optional()`.
    pub fn is_required(&self) -> bool {
        !self.is_optional()
    }

    /// Evaluate the field's paths against `credential`.
    ///
    /// > If the result returned no JSONPath match, skip to the next path array element.
    pub fn is_satisfied_by(&self, credential: &Value) -> Result<bool> {
        let validator = self.validator().transpose()?;

        for path in self.path.iter() {
            let json_path = serde_json_path::JsonPath::parse(path)
                .with_context(|| format!("invalid JSONPath `{path}`"))?;
            let found = json_path.query(credential).all();

            let accepted = match &validator {
                None => !found.is_empty(),
                Some(validator) => found.iter().any(|value| validator.is_valid(value)),
            };
            if accepted {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Return the requested field in the format specified in the constraints field,
    /// without changing its type casing, e.g. camelCase, snake_case, etc.
    ///
    /// e.g., `["$.credentialSubject.dateOfBirth"]` will return `["dateOfBirth"]`.
    pub fn requested_fields(&self) -> Vec<String> {
        self.path()
            .iter()
            .filter_map(|path| path.split(&['-', '.', ':', '@'][..]).last())
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Return the humanly-readable requested fields of the constraints field.
    ///
    /// e.g., `["$.credentialSubject.familyName"]` will return `["Family Name"]`.
    pub fn requested_fields_human_readable(&self) -> Vec<String> {
        self.requested_fields()
            .into_iter()
            .map(to_human_readable_string)
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintsLimitDisclosure {
    Required,
    Preferred,
}
