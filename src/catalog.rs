//! Model catalog and its discovery from the service's client bundle.
//!
//! The service publishes no model list. The catalog is recovered by scraping
//! the homepage for bundle asset paths ([`BundlePatternMatcher`]), finding the
//! one asset that defines the model table, and evaluating that definition in
//! the sandbox ([`CatalogExtractor`]). Upstream bundle changes surface as a
//! [`DiscoveryError`] instead of a partially filled catalog.

mod discovery;
mod matcher;

pub use discovery::CatalogExtractor;
pub use matcher::{BundlePatternMatcher, ModelExpression};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parameter name -> default value for one model.
pub type DefaultParams = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("no bundle asset paths found in the homepage markup")]
    NoBundlePaths,

    #[error("none of the {scanned} bundle assets contained the model definition")]
    NoModelDefinition { scanned: usize },

    #[error("model definition evaluated to an empty catalog")]
    EmptyCatalog,

    #[error("model definition is not a valid catalog: {0}")]
    Invalid(String),
}

/// One tunable generation parameter as the service describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Default value; absent values are left out of requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Range/type metadata, kept verbatim.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamDescriptor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelSpec {
    pub fn default_params(&self) -> DefaultParams {
        self.parameters
            .iter()
            .filter_map(|(name, param)| param.value.clone().map(|v| (name.clone(), v)))
            .collect()
    }
}

/// Model id -> spec. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelSpec>,
}

impl ModelCatalog {
    pub fn new(models: BTreeMap<String, ModelSpec>) -> Self {
        Self { models }
    }

    /// Build from the evaluated model definition, which must be a JSON object
    /// of model id -> spec.
    pub fn from_json(value: Value) -> Result<Self, DiscoveryError> {
        let Value::Object(entries) = value else {
            return Err(DiscoveryError::Invalid(format!(
                "expected an object of models, got {}",
                json_kind(&value)
            )));
        };
        let mut models = BTreeMap::new();
        for (id, spec) in entries {
            let spec: ModelSpec = serde_json::from_value(spec)
                .map_err(|e| DiscoveryError::Invalid(format!("model '{}': {}", id, e)))?;
            models.insert(id, spec);
        }
        Ok(Self { models })
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelSpec> {
        self.models.get(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelSpec)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Snapshot of a model's default parameter values.
    pub fn default_params(&self, model_id: &str) -> Option<DefaultParams> {
        self.get(model_id).map(ModelSpec::default_params)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "openai:gpt-3.5-turbo": {
                "id": "openai:gpt-3.5-turbo",
                "provider": "openai",
                "name": "gpt-3.5-turbo",
                "parameters": {
                    "temperature": { "value": 0.7, "range": [0, 1] },
                    "maximumLength": { "value": 200, "range": [50, 1024] },
                    "stopSequences": { "value": [], "range": [] },
                    "experimental": { "range": [0, 1] }
                }
            },
            "cohere:command": { "parameters": {} }
        })
    }

    #[test]
    fn parses_models_and_keeps_metadata() {
        let catalog = ModelCatalog::from_json(sample()).unwrap();
        assert_eq!(catalog.len(), 2);
        let spec = catalog.get("openai:gpt-3.5-turbo").unwrap();
        assert_eq!(spec.provider.as_deref(), Some("openai"));
        assert_eq!(spec.extra["name"], json!("gpt-3.5-turbo"));
        assert_eq!(spec.parameters["temperature"].metadata["range"], json!([0, 1]));
    }

    #[test]
    fn default_params_are_the_value_fields() {
        let catalog = ModelCatalog::from_json(sample()).unwrap();
        let defaults = catalog.default_params("openai:gpt-3.5-turbo").unwrap();
        assert_eq!(
            Value::Object(defaults),
            json!({ "maximumLength": 200, "stopSequences": [], "temperature": 0.7 })
        );
        assert!(catalog.default_params("cohere:command").unwrap().is_empty());
        assert!(catalog.default_params("missing").is_none());
    }

    #[test]
    fn rejects_non_object_definitions() {
        assert!(matches!(
            ModelCatalog::from_json(json!([1, 2])),
            Err(DiscoveryError::Invalid(_))
        ));
        assert!(matches!(
            ModelCatalog::from_json(json!({ "m": 3 })),
            Err(DiscoveryError::Invalid(_))
        ));
    }
}
