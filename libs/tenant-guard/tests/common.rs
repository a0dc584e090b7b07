#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tenant_context::{TenantContext, TenantContextProviderRef};
use tenant_guard::{
    EventKind, GuardConfig, GuardEvent, GuardObserver, GuardSetup, ModelDescription,
    MultiTenancySwitch, Operation, SchemaDescription, StorageClient,
};

/// `Invoice` requires a tenant, `User` may omit it, `Account` is an auth
/// table, `Tag` is global.
#[must_use]
pub fn schema() -> SchemaDescription {
    SchemaDescription::new()
        .model(ModelDescription::new("Invoice").required("id").required("status").required("tenantId"))
        .model(ModelDescription::new("User").required("email").optional("tenantId"))
        .model(ModelDescription::new("Account").required("userId").required("tenantId"))
        .model(ModelDescription::new("Tag").required("label"))
}

#[must_use]
pub fn user(tenant: &str) -> TenantContext {
    TenantContext::for_tenant(tenant).unwrap()
}

#[must_use]
pub fn super_admin(tenant: &str) -> TenantContext {
    TenantContext::builder()
        .tenant_id(tenant)
        .role("SUPER_ADMIN")
        .build()
        .unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub kind: EventKind,
    pub model: String,
    pub tenant_id: Option<String>,
    pub provided: Vec<String>,
}

/// Observer that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl GuardObserver for RecordingObserver {
    fn record(&self, event: &GuardEvent<'_>) {
        self.events.lock().push(Recorded {
            kind: event.kind,
            model: event.model.to_owned(),
            tenant_id: event.tenant_id.map(str::to_owned),
            provided: event.provided.to_vec(),
        });
    }
}

/// Storage double that records the operations it receives and echoes them back.
pub struct RecordingStore {
    schema: SchemaDescription,
    pub calls: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<Operation>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            schema: schema(),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageClient for RecordingStore {
    type Output = Operation;
    type Error = Infallible;

    fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    async fn execute(&self, op: Operation) -> Result<Operation, Infallible> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(op.clone());
        Ok(op)
    }
}

pub struct Harness {
    pub setup: GuardSetup,
    pub observer: Arc<RecordingObserver>,
    pub switch: Arc<MultiTenancySwitch>,
}

/// Enabled guard reading the given provider and recording its events.
pub fn harness(contexts: TenantContextProviderRef) -> Harness {
    let observer = Arc::new(RecordingObserver::default());
    let switch = Arc::new(MultiTenancySwitch::new(true));
    let setup = GuardSetup::new(GuardConfig {
        enabled: true,
        ..GuardConfig::default()
    })
    .with_flag(switch.clone())
    .with_context_provider(contexts)
    .with_observer(observer.clone());
    Harness {
        setup,
        observer,
        switch,
    }
}
