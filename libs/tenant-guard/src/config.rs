//! Guard configuration and the multi-tenancy switch.
//!
//! Layering, lowest priority first:
//! 1. built-in defaults
//! 2. optional YAML file
//! 3. `TENANT_GUARD__*` environment variables (`__` separates nesting)
//! 4. legacy `MULTI_TENANCY_ENABLED`, mapped onto `enabled`

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "TENANT_GUARD__";
pub const LEGACY_ENABLED_VAR: &str = "MULTI_TENANCY_ENABLED";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(#[source] Box<figment::Error>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Master switch; the guard passes everything through when off.
    pub enabled: bool,
    /// Name of the tenant column shared by guarded models.
    pub tenant_field: String,
    /// Models never scoped (authentication tables).
    pub exempt_models: BTreeSet<String>,
    /// Request paths whose operations are never scoped.
    pub auth_route_prefixes: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tenant_field: "tenantId".to_owned(),
            exempt_models: ["Account", "Session", "VerificationToken"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            auth_route_prefixes: vec!["/api/auth".to_owned()],
        }
    }
}

impl GuardConfig {
    /// Layered figment for this configuration; `path` adds the YAML layer.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(
                Env::raw()
                    .only(&[LEGACY_ENABLED_VAR])
                    .map(|_| "enabled".into()),
            )
    }

    /// Load from defaults, the optional file and the environment.
    ///
    /// # Errors
    /// [`ConfigError::MissingFile`] if `path` is given but is not a file,
    /// [`ConfigError::Invalid`] if any layer fails to deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path
            && !path.is_file()
        {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        Self::from_figment(&Self::figment(path))
    }

    /// Extract from an externally assembled figment.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] if the figment does not describe a config.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))
    }

    #[must_use]
    pub fn is_exempt_model(&self, model: &str) -> bool {
        self.exempt_models.contains(model)
    }

    /// Whether `request_url` (absolute URL or bare path) falls under one of
    /// the authentication prefixes. Matching is per path segment, so
    /// `/api/authors` is not under `/api/auth`.
    #[must_use]
    pub fn is_auth_route(&self, request_url: &str) -> bool {
        let path = request_path(request_url);
        self.auth_route_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim().trim_end_matches('/');
            !prefix.is_empty()
                && path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

fn request_path(request_url: &str) -> String {
    if let Ok(url) = url::Url::parse(request_url) {
        return url.path().to_owned();
    }
    let end = request_url.find(['?', '#']).unwrap_or(request_url.len());
    request_url[..end].to_owned()
}

/// Read side of the multi-tenancy feature flag, consulted on every operation.
pub trait MultiTenancyFlag: Send + Sync {
    fn is_enabled(&self) -> bool;
}

/// Process-wide toggle for multi-tenancy enforcement.
#[derive(Debug, Default)]
pub struct MultiTenancySwitch(AtomicBool);

impl MultiTenancySwitch {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }
}

impl MultiTenancyFlag for MultiTenancySwitch {
    fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
