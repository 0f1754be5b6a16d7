//! Extraction results and the values they hold

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field name under which every result stores its URL
pub const URL_FIELD: &str = "URL";

/// A single extracted value
///
/// Groups with exactly one sub-value fold into `Text`; every other group
/// keeps its sub-values as a `List`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Fold a group's sub-values into a field value
    pub fn fold(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Text(values.remove(0))
        } else {
            Self::List(values)
        }
    }

    /// The scalar text, if this is not a list
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::List(_) => None,
        }
    }

    /// Render as a single CSV cell; lists become their compact JSON text
    pub fn to_cell(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::List(values) => serde_json::to_string(values).unwrap_or_default(),
        }
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// The record produced for one successfully inspected URL
///
/// Field order is insertion order, with the URL always first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(rename = "URL")]
    url: String,

    #[serde(flatten)]
    fields: IndexMap<String, FieldValue>,
}

impl ExtractionResult {
    /// Create an empty result for a URL. Carriage returns are stripped.
    pub fn new(url: &str) -> Self {
        Self {
            url: strip_carriage_returns(url),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field, keeping its first position
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Look up a field by name; `URL` resolves to the URL itself
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        if name == URL_FIELD {
            Some(FieldValue::Text(self.url.clone()))
        } else {
            self.fields.get(name).cloned()
        }
    }

    /// Field names in order, starting with `URL`
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(URL_FIELD).chain(self.fields.keys().map(String::as_str))
    }
}

/// Remove every carriage return from a value
pub fn strip_carriage_returns(value: &str) -> String {
    value.replace('\r', "")
}
