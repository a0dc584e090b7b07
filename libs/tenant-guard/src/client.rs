//! Wrap-once attachment of the guard to a storage client.
//!
//! [`GuardSetup::register`] turns a raw [`StorageClient`] into a
//! [`GuardedClient`]. Registering a `GuardedClient` again hands it back
//! unchanged, and `GuardedClient` itself is not a `StorageClient`, so the
//! guard runs exactly once per operation no matter how often startup code
//! registers.

use std::sync::Arc;

use async_trait::async_trait;
use tenant_context::{AmbientContext, TenantContextProviderRef};

use crate::config::{GuardConfig, MultiTenancyFlag, MultiTenancySwitch};
use crate::enforcer::TenantGuard;
use crate::error::ClientError;
use crate::observe::{
    GuardObserverRef, LoggingObserver, MetricsObserver, Observers, default_observer,
};
use crate::operation::Operation;
use crate::schema::{SchemaDescription, SchemaRegistry};

/// Storage engine the guard sits in front of.
#[async_trait]
pub trait StorageClient: Send + Sync {
    type Output: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Declared models, read once at registration.
    fn schema(&self) -> &SchemaDescription;

    async fn execute(&self, op: Operation) -> Result<Self::Output, Self::Error>;
}

/// A storage client with the tenant guard attached.
pub struct GuardedClient<S> {
    inner: S,
    guard: Arc<TenantGuard>,
}

impl<S: StorageClient> GuardedClient<S> {
    /// Run the guard on `op`, then hand the (possibly rewritten) operation
    /// to storage. Storage is not called when the guard blocks.
    ///
    /// # Errors
    /// [`ClientError::Guard`] on a blocked operation,
    /// [`ClientError::Storage`] when the storage call fails.
    pub async fn execute(&self, mut op: Operation) -> Result<S::Output, ClientError<S::Error>> {
        self.guard.enforce(&mut op)?;
        self.inner.execute(op).await.map_err(ClientError::Storage)
    }

    #[must_use]
    pub fn guard(&self) -> &TenantGuard {
        &self.guard
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaDescription {
        self.inner.schema()
    }
}

/// Everything the guard needs besides the client's schema.
#[derive(Clone)]
pub struct GuardSetup {
    config: GuardConfig,
    flag: Arc<dyn MultiTenancyFlag>,
    contexts: TenantContextProviderRef,
    observer: GuardObserverRef,
}

impl GuardSetup {
    /// Defaults: a switch seeded from `config.enabled`, the ambient request
    /// context, tracing output and counters on the default prometheus registry.
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        let flag = Arc::new(MultiTenancySwitch::new(config.enabled));
        Self {
            config,
            flag,
            contexts: Arc::new(AmbientContext),
            observer: default_observer(),
        }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: Arc<dyn MultiTenancyFlag>) -> Self {
        self.flag = flag;
        self
    }

    #[must_use]
    pub fn with_context_provider(mut self, contexts: TenantContextProviderRef) -> Self {
        self.contexts = contexts;
        self
    }

    /// Log as usual but count into `metrics` instead of the process-wide
    /// counters.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsObserver) -> Self {
        self.observer = Arc::new(Observers::new().with(LoggingObserver).with(metrics));
        self
    }

    /// Replace every sink, logging included.
    #[must_use]
    pub fn with_observer(mut self, observer: GuardObserverRef) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Build a guard for `schema`. The registry is computed here, once.
    #[must_use]
    pub fn guard_for(&self, schema: &SchemaDescription) -> TenantGuard {
        let registry = SchemaRegistry::build(schema, &self.config.tenant_field);
        tracing::debug!(
            guarded_models = registry.len(),
            tenant_field = %self.config.tenant_field,
            "tenant guard registry built"
        );
        TenantGuard::new(
            self.config.clone(),
            Arc::new(registry),
            Arc::clone(&self.flag),
            Arc::clone(&self.contexts),
            Arc::clone(&self.observer),
        )
    }

    /// Attach the guard to `client`. Idempotent.
    #[must_use]
    pub fn register<R: RegisterTenantGuard>(&self, client: R) -> GuardedClient<R::Inner> {
        client.register_with(self)
    }
}

/// Anything [`GuardSetup::register`] accepts.
pub trait RegisterTenantGuard {
    type Inner: StorageClient;

    fn register_with(self, setup: &GuardSetup) -> GuardedClient<Self::Inner>;
}

impl<S: StorageClient> RegisterTenantGuard for S {
    type Inner = S;

    fn register_with(self, setup: &GuardSetup) -> GuardedClient<S> {
        let guard = Arc::new(setup.guard_for(self.schema()));
        GuardedClient { inner: self, guard }
    }
}

impl<S: StorageClient> RegisterTenantGuard for GuardedClient<S> {
    type Inner = S;

    fn register_with(self, _setup: &GuardSetup) -> Self {
        tracing::debug!("tenant guard already registered, keeping existing hook");
        self
    }
}
