//! Conversion between caller types and stored entity properties.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stash_types::{Properties, StoreError, StoreResult};

/// Encode a caller value as entity properties.
///
/// Only values that serialize to a JSON object (structs and maps) can be
/// stored as entities.
pub fn encode_entity<T: Serialize>(value: &T) -> StoreResult<Properties> {
    match serde_json::to_value(value) {
        Ok(Value::Object(props)) => Ok(props),
        Ok(other) => Err(StoreError::TypeMismatch(format!(
            "{} does not encode as an entity (got {})",
            std::any::type_name::<T>(),
            json_type(&other)
        ))),
        Err(e) => Err(StoreError::TypeMismatch(format!(
            "{} cannot be encoded: {e}",
            std::any::type_name::<T>()
        ))),
    }
}

/// Decode stored properties into a caller value.
///
/// A stored shape the destination cannot be built from is a hard
/// `TypeMismatch`. A stored field the destination drops decodes anyway and
/// comes back as a `FieldMismatch` warning, found by re-encoding the decoded
/// value and comparing field sets.
pub fn decode_entity<T>(props: Properties) -> StoreResult<(T, Option<StoreError>)>
where
    T: Serialize + DeserializeOwned,
{
    let stored = Value::Object(props);
    let value = T::deserialize(&stored).map_err(|e| {
        StoreError::TypeMismatch(format!(
            "cannot decode stored entity into {}: {e}",
            std::any::type_name::<T>()
        ))
    })?;

    let warning = match (&stored, serde_json::to_value(&value)) {
        (Value::Object(stored), Ok(Value::Object(decoded))) => stored
            .keys()
            .find(|field| !decoded.contains_key(*field))
            .map(|field| StoreError::FieldMismatch {
                field: field.clone(),
            }),
        _ => None,
    };
    Ok((value, warning))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
