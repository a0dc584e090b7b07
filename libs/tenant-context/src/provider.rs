use std::sync::Arc;

use crate::ambient;
use crate::context::TenantContext;

/// Source of the tenant context for the operation being guarded.
///
/// The data layer reads the context through this trait instead of touching
/// the task-local slot directly, so tools and tests can supply a context
/// without entering a request scope.
pub trait TenantContextProvider: Send + Sync {
    /// Returns the context of the in-flight request, `None` when there is none.
    fn context_or_null(&self) -> Option<Arc<TenantContext>>;
}

pub type TenantContextProviderRef = Arc<dyn TenantContextProvider>;

/// Provider backed by the task-local request scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientContext;

impl TenantContextProvider for AmbientContext {
    fn context_or_null(&self) -> Option<Arc<TenantContext>> {
        ambient::context_or_null()
    }
}

/// Provider that always answers with the same context (or none).
#[derive(Debug, Clone, Default)]
pub struct FixedContext(Option<Arc<TenantContext>>);

impl FixedContext {
    #[must_use]
    pub fn new(ctx: TenantContext) -> Self {
        Self(Some(Arc::new(ctx)))
    }

    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }
}

impl TenantContextProvider for FixedContext {
    fn context_or_null(&self) -> Option<Arc<TenantContext>> {
        self.0.clone()
    }
}
