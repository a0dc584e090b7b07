use chrono::{DateTime, Utc};

/// Role name that grants the cross-tenant (super-admin) bypass.
pub const SUPER_ADMIN_ROLE: &str = "SUPER_ADMIN";

/// Errors raised while assembling a [`TenantContext`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("tenant context requires a non-empty tenant id")]
    MissingTenantId,
}

/// `TenantContext` identifies the tenant a request acts for.
///
/// One instance is visible per logical request. It is created when the
/// request enters the system, read by the data layer while the request runs
/// and dropped when the request scope ends. It is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TenantContext {
    tenant_id: String,
    tenant_slug: Option<String>,
    user_id: Option<String>,
    role: Option<String>,
    tenant_role: Option<String>,
    is_super_admin: bool,
    request_id: Option<String>,
    started_at: DateTime<Utc>,
}

impl TenantContext {
    /// Create a new `TenantContext` builder
    #[must_use]
    pub fn builder() -> TenantContextBuilder {
        TenantContextBuilder::default()
    }

    /// Shorthand for a regular (non-privileged) context of `tenant_id`.
    ///
    /// # Errors
    /// Returns [`ContextError::MissingTenantId`] if `tenant_id` is blank.
    pub fn for_tenant(tenant_id: impl Into<String>) -> Result<Self, ContextError> {
        Self::builder().tenant_id(tenant_id).build()
    }

    /// Get the tenant ID the request acts for
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    #[must_use]
    pub fn tenant_slug(&self) -> Option<&str> {
        self.tenant_slug.as_deref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Platform-wide role of the acting user (e.g. `ADMIN`, `SUPER_ADMIN`)
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Role of the acting user inside the tenant (e.g. `OWNER`)
    #[must_use]
    pub fn tenant_role(&self) -> Option<&str> {
        self.tenant_role.as_deref()
    }

    /// Whether the request may operate across tenants.
    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.is_super_admin
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// When the request scope was established
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[derive(Default)]
pub struct TenantContextBuilder {
    tenant_id: Option<String>,
    tenant_slug: Option<String>,
    user_id: Option<String>,
    role: Option<String>,
    tenant_role: Option<String>,
    super_admin: Option<bool>,
    request_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl TenantContextBuilder {
    #[must_use]
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn tenant_slug(mut self, slug: impl Into<String>) -> Self {
        self.tenant_slug = Some(slug.into());
        self
    }

    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the platform role. [`SUPER_ADMIN_ROLE`] implies the super-admin
    /// flag unless [`Self::super_admin`] sets it explicitly.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn tenant_role(mut self, role: impl Into<String>) -> Self {
        self.tenant_role = Some(role.into());
        self
    }

    #[must_use]
    pub fn super_admin(mut self, super_admin: bool) -> Self {
        self.super_admin = Some(super_admin);
        self
    }

    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Build the context.
    ///
    /// # Errors
    /// Returns [`ContextError::MissingTenantId`] when no tenant id was given
    /// or it is blank; a tenant-less context must never reach the data layer.
    pub fn build(self) -> Result<TenantContext, ContextError> {
        let tenant_id = self
            .tenant_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ContextError::MissingTenantId)?;

        let is_super_admin = self
            .super_admin
            .unwrap_or_else(|| self.role.as_deref() == Some(SUPER_ADMIN_ROLE));

        Ok(TenantContext {
            tenant_id,
            tenant_slug: self.tenant_slug,
            user_id: self.user_id,
            role: self.role,
            tenant_role: self.tenant_role,
            is_super_admin,
            request_id: self.request_id,
            started_at: self.started_at.unwrap_or_else(Utc::now),
        })
    }
}
