//! Guard events and the sinks that record them.
//!
//! | Event | Metric | Severity |
//! |-------|--------|----------|
//! | auto-inject on create | `tenant_guard.auto_inject` | debug |
//! | auto-scope of a filter | `tenant_guard.auto_scope` | debug |
//! | privileged unscoped read | `tenant_guard.warn.read_without_tenant` | warn |
//! | any block | `tenant_guard.error.*` | error |
//!
//! Sinks must never fail the operation that produced the event: panics are
//! caught and dropped at every fan-out point.
//!
//! Unless told otherwise, a guard both logs and counts: [`default_observer`]
//! pairs [`LoggingObserver`] with [`MetricsObserver::process`], whose
//! counters live on the prometheus default registry.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};

use prometheus::{IntCounterVec, Opts, Registry};

use crate::action::GuardedAction;

static PROCESS_METRICS: OnceLock<Option<MetricsObserver>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AutoInjected,
    AutoScoped,
    ReadWithoutTenant,
    MissingContext,
    CreateMalformed,
    CreateMissingTenant,
    CreateMismatch,
    BulkMissingScope,
    BulkMismatch,
    MutationMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Warn,
    Error,
}

impl EventKind {
    pub const ALL: [Self; 10] = [
        Self::AutoInjected,
        Self::AutoScoped,
        Self::ReadWithoutTenant,
        Self::MissingContext,
        Self::CreateMalformed,
        Self::CreateMissingTenant,
        Self::CreateMismatch,
        Self::BulkMissingScope,
        Self::BulkMismatch,
        Self::MutationMismatch,
    ];

    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::AutoInjected | Self::AutoScoped => Severity::Debug,
            Self::ReadWithoutTenant => Severity::Warn,
            Self::MissingContext
            | Self::CreateMalformed
            | Self::CreateMissingTenant
            | Self::CreateMismatch
            | Self::BulkMissingScope
            | Self::BulkMismatch
            | Self::MutationMismatch => Severity::Error,
        }
    }

    /// Dotted metric name as it appears in logs.
    #[must_use]
    pub const fn metric_name(self) -> &'static str {
        match self {
            Self::AutoInjected => "tenant_guard.auto_inject",
            Self::AutoScoped => "tenant_guard.auto_scope",
            Self::ReadWithoutTenant => "tenant_guard.warn.read_without_tenant",
            Self::MissingContext => "tenant_guard.error.missing_context",
            Self::CreateMalformed => "tenant_guard.error.create.malformed",
            Self::CreateMissingTenant => "tenant_guard.error.create.missing_tenant",
            Self::CreateMismatch => "tenant_guard.error.create.mismatch",
            Self::BulkMissingScope => "tenant_guard.error.bulk.missing_scope",
            Self::BulkMismatch => "tenant_guard.error.bulk.mismatch",
            Self::MutationMismatch => "tenant_guard.error.mutation_mismatch",
        }
    }

    /// Prometheus counter name, e.g. `tenant_guard_error_bulk_mismatch_total`.
    #[must_use]
    pub fn prometheus_name(self) -> String {
        format!("{}_total", self.metric_name().replace('.', "_"))
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::AutoInjected => "tenant id injected into create payload",
            Self::AutoScoped => "filter scoped to request tenant",
            Self::ReadWithoutTenant => "privileged read without tenant constraint",
            Self::MissingContext => "blocked: no tenant context",
            Self::CreateMalformed => "blocked: malformed create payload",
            Self::CreateMissingTenant => "blocked: create without tenant id",
            Self::CreateMismatch => "blocked: create for foreign tenant",
            Self::BulkMissingScope => "blocked: bulk mutation without tenant scope",
            Self::BulkMismatch => "blocked: bulk mutation for foreign tenant",
            Self::MutationMismatch => "blocked: mutation for foreign tenant",
        }
    }
}

/// One guard decision worth recording.
#[derive(Debug, Clone, Copy)]
pub struct GuardEvent<'a> {
    pub kind: EventKind,
    pub model: &'a str,
    pub action: GuardedAction,
    /// Tenant of the request, `None` when there was no context.
    pub tenant_id: Option<&'a str>,
    /// Tenant ids named by the operation, when they matter for the event.
    pub provided: &'a [String],
}

/// Sink for guard events.
pub trait GuardObserver: Send + Sync {
    fn record(&self, event: &GuardEvent<'_>);
}

pub type GuardObserverRef = Arc<dyn GuardObserver>;

/// Deliver `event`, swallowing a panicking sink.
pub(crate) fn record_contained(observer: &dyn GuardObserver, event: &GuardEvent<'_>) {
    if catch_unwind(AssertUnwindSafe(|| observer.record(event))).is_err() {
        tracing::debug!(metric = event.kind.metric_name(), "guard observer panicked");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl GuardObserver for NoopObserver {
    fn record(&self, _event: &GuardEvent<'_>) {}
}

/// Writes events to `tracing` at their severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl GuardObserver for LoggingObserver {
    fn record(&self, event: &GuardEvent<'_>) {
        let metric = event.kind.metric_name();
        let action = event.action.as_str();
        match event.kind.severity() {
            Severity::Debug => tracing::debug!(
                model = event.model,
                action,
                tenant_id = ?event.tenant_id,
                metric,
                "{}",
                event.kind.message()
            ),
            Severity::Warn => tracing::warn!(
                model = event.model,
                action,
                tenant_id = ?event.tenant_id,
                metric,
                "{}",
                event.kind.message()
            ),
            Severity::Error => tracing::error!(
                model = event.model,
                action,
                tenant_id = ?event.tenant_id,
                provided_tenant_ids = ?event.provided,
                metric,
                "{}",
                event.kind.message()
            ),
        }
    }
}

/// Prometheus counters, one `IntCounterVec` per event kind, labelled by
/// `model` and `action`.
#[derive(Clone)]
pub struct MetricsObserver {
    counters: HashMap<EventKind, IntCounterVec>,
}

impl MetricsObserver {
    /// Create the counters and register them with `registry`.
    ///
    /// # Errors
    /// Fails if a counter is malformed or already registered.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let mut counters = HashMap::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let counter = IntCounterVec::new(
                Opts::new(kind.prometheus_name(), kind.message()),
                &["model", "action"],
            )?;
            registry.register(Box::new(counter.clone()))?;
            counters.insert(kind, counter);
        }
        Ok(Self { counters })
    }

    /// Counters on `prometheus::default_registry()`, registered on first use.
    /// `None` if the names were already taken there by someone else.
    #[must_use]
    pub fn process() -> Option<&'static Self> {
        PROCESS_METRICS
            .get_or_init(|| match Self::register(prometheus::default_registry()) {
                Ok(metrics) => Some(metrics),
                Err(err) => {
                    tracing::warn!(error = %err, "tenant guard counters not registered");
                    None
                }
            })
            .as_ref()
    }

    /// Current value of one counter series.
    #[must_use]
    pub fn count(&self, kind: EventKind, model: &str, action: GuardedAction) -> u64 {
        self.counters
            .get(&kind)
            .and_then(|c| c.get_metric_with_label_values(&[model, action.as_str()]).ok())
            .map_or(0, |c| c.get())
    }
}

impl GuardObserver for MetricsObserver {
    fn record(&self, event: &GuardEvent<'_>) {
        let Some(counter) = self.counters.get(&event.kind) else {
            return;
        };
        // Label cardinality is checked by prometheus; a failure only loses the sample.
        if let Ok(series) =
            counter.get_metric_with_label_values(&[event.model, event.action.as_str()])
        {
            series.inc();
        }
    }
}

/// Fan-out to several sinks. One failing sink does not starve the others.
#[derive(Clone, Default)]
pub struct Observers {
    sinks: Vec<GuardObserverRef>,
}

impl Observers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: impl GuardObserver + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn push(&mut self, sink: GuardObserverRef) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl GuardObserver for Observers {
    fn record(&self, event: &GuardEvent<'_>) {
        for sink in &self.sinks {
            record_contained(sink.as_ref(), event);
        }
    }
}

/// Logging plus process-wide counters.
#[must_use]
pub fn default_observer() -> GuardObserverRef {
    let sinks = Observers::new().with(LoggingObserver);
    Arc::new(match MetricsObserver::process() {
        Some(metrics) => sinks.with(metrics.clone()),
        None => sinks,
    })
}
