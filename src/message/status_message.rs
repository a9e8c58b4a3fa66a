use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// The RPC method returning the full device status.
pub(crate) const METHOD: &str = "Shelly.GetStatus";

/// The result of `Shelly.GetStatus`: one entry per component instance,
/// keyed like `"switch:0"`, `"voltmeter:100"`, `"sys"` or `"wifi"`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage(Map<String, Value>);

impl StatusMessage {
    pub fn new(result: Value) -> Result<Self> {
        match result {
            Value::Object(components) => Ok(Self(components)),
            other => Err(Error::Protocol(format!("status result is not an object: {other}"))),
        }
    }

    pub fn component(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// A numeric field of a component, kept as the JSON number the device sent.
    pub fn number(&self, key: &str, field: &str) -> Option<Value> {
        self.component(key)?
            .get(field)
            .filter(|v| v.is_number())
            .cloned()
    }

    pub fn string(&self, key: &str, field: &str) -> Option<String> {
        self.component(key)?.get(field)?.as_str().map(str::to_owned)
    }

    /// A boolean field of a component that is present; a missing field reads as `false`.
    pub fn flag(&self, key: &str, field: &str) -> Option<bool> {
        let component = self.component(key)?;
        Some(component.get(field).and_then(Value::as_bool).unwrap_or(false))
    }

    /// Whether a component is present and has a non-null value for `field`.
    pub fn has_value(&self, key: &str, field: &str) -> Option<bool> {
        let component = self.component(key)?;
        Some(component.get(field).is_some_and(|v| !v.is_null()))
    }
}
