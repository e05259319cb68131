use serde_json::{Map, Value};

/// Field conditions for [`super::DocumentStore::find_in_collection`].
///
/// A string condition matches any string field containing it, ignoring case.
/// Any other value must be equal. Items missing the field never match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn matches(&self, item: &Value) -> bool {
        self.fields.iter().all(|(key, wanted)| match item.get(key) {
            None => false,
            Some(actual) => match (wanted, actual) {
                (Value::String(needle), Value::String(hay)) => {
                    hay.to_lowercase().contains(&needle.to_lowercase())
                }
                (Value::String(_), _) => false,
                (wanted, actual) => wanted == actual,
            },
        })
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
