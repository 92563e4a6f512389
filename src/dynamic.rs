//! JSON-backed records with a shape checked at run time.
//!
//! The shape (key set and each value's JSON kind) is captured when the
//! record is created. Writes to undeclared keys are governed by
//! [`UnknownFieldPolicy`].

use crate::error::{Result, StateError};
use crate::record::Record;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What to do when a write names a key the record was not created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFieldPolicy {
    /// Fail with [`StateError::UnknownField`].
    Reject,
    /// Add the key to the record and its shape.
    Extend,
}

impl Default for UnknownFieldPolicy {
    fn default() -> Self {
        UnknownFieldPolicy::Reject
    }
}

/// JSON value kind used for shape checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Bool,
            Value::Number(_) => JsonKind::Number,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }

    /// A field declared `null` accepts any kind.
    fn accepts(self, other: JsonKind) -> bool {
        self == JsonKind::Null || self == other
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonKind::Null => "null",
            JsonKind::Bool => "bool",
            JsonKind::Number => "number",
            JsonKind::String => "string",
            JsonKind::Array => "array",
            JsonKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// A flat JSON object whose shape is fixed at creation.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonRecord {
    fields: Map<String, Value>,
    shape: Arc<BTreeMap<String, JsonKind>>,
    policy: UnknownFieldPolicy,
}

impl JsonRecord {
    /// Wrap a JSON object. Any other value is rejected.
    pub fn new(value: Value, policy: UnknownFieldPolicy) -> Result<Self> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(StateError::NotAnObject(JsonKind::of(&other).to_string())),
        };
        let shape = fields
            .iter()
            .map(|(k, v)| (k.clone(), JsonKind::of(v)))
            .collect();

        Ok(Self {
            fields,
            shape: Arc::new(shape),
            policy,
        })
    }

    /// Build from any serializable struct.
    pub fn from_serialize<T: Serialize>(value: &T, policy: UnknownFieldPolicy) -> Result<Self> {
        Self::new(serde_json::to_value(value)?, policy)
    }

    /// Convert back into a typed value.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn policy(&self) -> UnknownFieldPolicy {
        self.policy
    }

    /// Declared kind of `key`, if it is part of the shape.
    pub fn kind_of(&self, key: &str) -> Option<JsonKind> {
        self.shape.get(key).copied()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Check that `key` may be written under the record's policy.
    pub fn check_key(&self, key: &str) -> Result<()> {
        if self.shape.contains_key(key) || self.policy == UnknownFieldPolicy::Extend {
            Ok(())
        } else {
            Err(StateError::UnknownField(key.to_string()))
        }
    }

    /// Check that `value` may be written to `key`.
    pub fn check_value(&self, key: &str, value: &Value) -> Result<()> {
        match self.shape.get(key) {
            Some(declared) => {
                let got = JsonKind::of(value);
                if declared.accepts(got) {
                    Ok(())
                } else {
                    Err(StateError::TypeMismatch {
                        field: key.to_string(),
                        expected: declared.to_string(),
                        got: got.to_string(),
                    })
                }
            }
            None => self.check_key(key),
        }
    }

    /// Write one key after checking it against the shape.
    pub fn insert_checked(&mut self, key: &str, value: Value) -> Result<()> {
        self.check_value(key, &value)?;
        if !self.shape.contains_key(key) {
            Arc::make_mut(&mut self.shape).insert(key.to_string(), JsonKind::of(&value));
        }
        self.fields.insert(key.to_string(), value);
        Ok(())
    }
}

impl Record for JsonRecord {
    type Patch = Map<String, Value>;

    fn apply_patch(&mut self, patch: Self::Patch) -> Result<()> {
        for (key, value) in &patch {
            self.check_value(key, value)?;
        }
        for (key, value) in patch {
            self.insert_checked(&key, value)?;
        }
        Ok(())
    }

    fn diff(&self, other: &Self) -> Vec<String> {
        let mut changed: Vec<String> = self
            .fields
            .iter()
            .filter(|(k, v)| other.fields.get(k.as_str()) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect();
        changed.extend(
            other
                .fields
                .keys()
                .filter(|k| !self.fields.contains_key(k.as_str()))
                .cloned(),
        );
        changed
    }
}
