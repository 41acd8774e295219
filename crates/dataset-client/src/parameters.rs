use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// One named command argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

/// Ordered name/value arguments for one command, sent as a single JSON
/// object in the request body. Parameters that are never set are simply
/// absent from the body. Immutable once the request has been issued (the
/// command serializes a snapshot).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBag {
    entries: Vec<Parameter>,
}

impl ParameterBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any previous value under the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.name == name) {
            existing.value = value;
        } else {
            self.entries.push(Parameter { name, value });
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.iter()
    }
}

impl Serialize for ParameterBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for parameter in &self.entries {
            map.serialize_entry(&parameter.name, &parameter.value)?;
        }
        map.end()
    }
}
