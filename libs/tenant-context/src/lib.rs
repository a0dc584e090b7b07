#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Request-scoped tenant identity.
//!
//! Request handling code enters a scope with [`scope`] (async) or
//! [`sync_scope`] (sync); everything that runs inside observes the context
//! through [`context_or_null`] or a [`TenantContextProvider`]. Scopes live in
//! a tokio task-local slot, so concurrent requests sharing worker threads
//! never observe each other's tenant.
//!
//! ```
//! use tenant_context::{TenantContext, context_or_null, sync_scope};
//!
//! let ctx = TenantContext::builder().tenant_id("tenant-a").build().unwrap();
//! let seen = sync_scope(ctx, || context_or_null().map(|c| c.tenant_id().to_owned()));
//! assert_eq!(seen.as_deref(), Some("tenant-a"));
//! assert!(context_or_null().is_none());
//! ```

pub mod ambient;
pub mod context;
pub mod provider;

pub use ambient::{context_or_null, in_current_scope, scope, sync_scope};
pub use context::{ContextError, SUPER_ADMIN_ROLE, TenantContext, TenantContextBuilder};
pub use provider::{AmbientContext, FixedContext, TenantContextProvider, TenantContextProviderRef};
