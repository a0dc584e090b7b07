#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant isolation guard for multi-tenant data access.
//!
//! Every operation sent through a [`GuardedClient`] is checked against the
//! tenant of the current request before it reaches storage: create payloads
//! get the tenant filled in, filters get narrowed to it, and operations that
//! would touch another tenant's rows are refused with a [`GuardError`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use tenant_context::{FixedContext, TenantContext};
//! use tenant_guard::{
//!     Filter, GuardConfig, GuardSetup, GuardedAction, ModelDescription, Operation,
//!     SchemaDescription,
//! };
//!
//! let schema = SchemaDescription::new()
//!     .model(ModelDescription::new("Invoice").required("id").required("tenantId"));
//! let ctx = TenantContext::for_tenant("tenant-a").unwrap();
//! let guard = GuardSetup::new(GuardConfig { enabled: true, ..GuardConfig::default() })
//!     .with_context_provider(Arc::new(FixedContext::new(ctx)))
//!     .guard_for(&schema);
//!
//! let mut op = Operation::new("Invoice", GuardedAction::FindMany);
//! guard.enforce(&mut op).unwrap();
//! assert_eq!(op.args.filter, Some(Filter::equals("tenantId", "tenant-a")));
//! ```

pub mod action;
pub mod client;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod extract;
pub mod filter;
pub mod observe;
pub mod operation;
pub mod schema;

pub use action::{ActionClass, GuardedAction};
pub use client::{GuardSetup, GuardedClient, RegisterTenantGuard, StorageClient};
pub use config::{ConfigError, GuardConfig, MultiTenancyFlag, MultiTenancySwitch};
pub use enforcer::{TenantGuard, Verdict};
pub use error::{ClientError, GuardError};
pub use extract::{
    condition_tenant_values, extract_tenant_values, pinned_tenant_values, value_tenant_values,
};
pub use filter::{Condition, Filter, FilterError};
pub use observe::{
    EventKind, GuardEvent, GuardObserver, GuardObserverRef, LoggingObserver, MetricsObserver,
    NoopObserver, Observers, Severity, default_observer,
};
pub use operation::{Operation, OperationArgs};
pub use schema::{
    FieldDescription, ModelDescription, ModelTenantConfig, SchemaDescription, SchemaRegistry,
};
