//! Declared model metadata and the tenant registry built from it.

use std::collections::BTreeMap;
use std::path::Path;

use figment::Figment;
use figment::providers::{Format, Yaml};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Structural description of the models a storage client serves.
///
/// ```yaml
/// models:
///   - name: Invoice
///     fields:
///       - name: id
///       - name: tenantId
///   - name: User
///     fields:
///       - name: tenantId
///         required: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDescription {
    #[serde(default)]
    pub models: Vec<ModelDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDescription {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescription {
    pub name: String,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

const fn required_by_default() -> bool {
    true
}

impl SchemaDescription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a model; chainable for fixtures.
    #[must_use]
    pub fn model(mut self, model: ModelDescription) -> Self {
        self.models.push(model);
        self
    }

    /// Load a description from a YAML file.
    ///
    /// # Errors
    /// [`ConfigError::MissingFile`] if `path` is not a file,
    /// [`ConfigError::Invalid`] if it does not describe a schema.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        Figment::new()
            .merge(Yaml::file(path))
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))
    }
}

impl ModelDescription {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(mut self, field: impl Into<String>) -> Self {
        self.fields.push(FieldDescription {
            name: field.into(),
            required: true,
        });
        self
    }

    #[must_use]
    pub fn optional(mut self, field: impl Into<String>) -> Self {
        self.fields.push(FieldDescription {
            name: field.into(),
            required: false,
        });
        self
    }
}

/// How a model stores its tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelTenantConfig {
    pub field: String,
    /// The column is nullable; privileged writers may leave it empty.
    pub optional: bool,
}

/// Immutable map from model name to its tenant configuration.
///
/// Models without the tenant field are absent and are not guarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRegistry {
    models: BTreeMap<String, ModelTenantConfig>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn build(schema: &SchemaDescription, tenant_field: &str) -> Self {
        let models = schema
            .models
            .iter()
            .filter_map(|model| {
                model
                    .fields
                    .iter()
                    .find(|f| f.name == tenant_field)
                    .map(|f| {
                        let config = ModelTenantConfig {
                            field: f.name.clone(),
                            optional: !f.required,
                        };
                        (model.name.clone(), config)
                    })
            })
            .collect();
        Self { models }
    }

    #[must_use]
    pub fn get(&self, model: &str) -> Option<&ModelTenantConfig> {
        self.models.get(model)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Entries sorted by model name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelTenantConfig)> {
        self.models.iter().map(|(name, cfg)| (name.as_str(), cfg))
    }
}
