//! Purpose: Dynamic attribute value model and its opaque byte encoding.
//! Exports: `Value`, `Attributes`, `serialize_attributes`, `deserialize_attributes`.
//! Invariants: Round trips are lossless except numbers, which normalize to f64.
//! Invariants: Payload bytes are opaque to the storage engine; codec failures
//! surface as storage errors, not user-recoverable validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::key::Key;

/// Closed union over the JSON-shaped value model. A closed enum keeps the
/// serializer and wire translator exhaustive under `match`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

pub type Attributes = BTreeMap<String, Value>;

/// One stored document: a composite key plus its attribute map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: Key,
    pub attributes: Attributes,
}

impl Item {
    pub fn new(key: Key, attributes: Attributes) -> Self {
        Self { key, attributes }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

pub fn serialize_attributes(attributes: &Attributes) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(attributes).map_err(|err| {
        Error::new(ErrorKind::Storage)
            .with_message("failed to serialize attributes")
            .with_source(err)
    })
}

pub fn deserialize_attributes(payload: &[u8]) -> Result<Attributes, Error> {
    serde_json::from_slice(payload).map_err(|err| {
        Error::new(ErrorKind::Storage)
            .with_message("failed to deserialize attributes")
            .with_source(err)
    })
}
