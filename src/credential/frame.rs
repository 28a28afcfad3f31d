use serde_json::{Map, Value};

/// Top level properties a framed credential always keeps.
const MANDATORY: [&str; 8] = [
    "@context",
    "id",
    "type",
    "issuer",
    "issuanceDate",
    "expirationDate",
    "credentialSchema",
    "credentialStatus",
];

/// Apply a JSON-LD style frame to an unsigned credential.
///
/// Every framed object keeps its `id` and `type`. A property named by the
/// frame is revealed in full when its frame is empty, and framed recursively
/// otherwise. Frame keywords (`@context`, `@explicit`, ...) are not
/// properties.
pub fn apply_frame(credential: &Value, frame: &Value) -> Value {
    let Some(source) = credential.as_object() else {
        return credential.clone();
    };

    let mut framed = Map::new();
    for key in MANDATORY {
        if let Some(value) = source.get(key) {
            framed.insert(key.to_owned(), value.clone());
        }
    }

    if let Some(frame) = frame.as_object() {
        frame_properties(source, frame, &mut framed);
    }
    Value::Object(framed)
}

fn frame_object(source: &Map<String, Value>, frame: &Map<String, Value>) -> Map<String, Value> {
    let mut framed = Map::new();
    for key in ["id", "type"] {
        if let Some(value) = source.get(key) {
            framed.insert(key.to_owned(), value.clone());
        }
    }
    frame_properties(source, frame, &mut framed);
    framed
}

fn frame_properties(
    source: &Map<String, Value>,
    frame: &Map<String, Value>,
    framed: &mut Map<String, Value>,
) {
    for (key, sub_frame) in frame {
        if key.starts_with('@') || (framed.contains_key(key) && !sub_frame.is_object()) {
            continue;
        }
        let Some(value) = source.get(key) else {
            continue;
        };

        let revealed = match (value, sub_frame.as_object()) {
            (Value::Object(object), Some(sub_frame)) if has_properties(sub_frame) => {
                Value::Object(frame_object(object, sub_frame))
            }
            (Value::Array(items), Some(sub_frame)) if has_properties(sub_frame) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(object) => Value::Object(frame_object(object, sub_frame)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            _ => value.clone(),
        };
        framed.insert(key.clone(), revealed);
    }
}

fn has_properties(frame: &Map<String, Value>) -> bool {
    frame.keys().any(|key| !key.starts_with('@'))
}
