//! The per-operation tenant policy.
//!
//! # Policy Rules
//! 1. **Disabled / exempt** (flag off, exempt model, auth route) → pass through
//! 2. **Model without tenant field** → pass through
//! 3. **No context** → block (`MissingTenantContext`)
//! 4. **Regular user** → inject the tenant into create payloads and narrow every
//!    filter to the request tenant, then check:
//!    - creates carry exactly the request tenant
//!    - bulk and single mutations name no other tenant
//!    - updates do not move rows to another tenant
//! 5. **Super admin** → nothing is rewritten; creates must still carry a
//!    tenant (unless the column is optional), bulk mutations must still name
//!    one, and unscoped reads are reported.
//!
//! Every rewrite and every block is reported to the observer. Blocks report
//! before the error is returned.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tenant_context::TenantContextProviderRef;

use crate::action::{ActionClass, GuardedAction};
use crate::config::{GuardConfig, MultiTenancyFlag};
use crate::error::GuardError;
use crate::extract::{extract_tenant_values, pinned_tenant_values, value_tenant_values};
use crate::filter::Filter;
use crate::observe::{EventKind, GuardEvent, GuardObserverRef, record_contained};
use crate::operation::Operation;
use crate::schema::{ModelTenantConfig, SchemaRegistry};

/// Outcome of a successful [`TenantGuard::enforce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Multi-tenancy is switched off.
    Disabled,
    /// Exempt model or authentication route.
    Exempt,
    /// The model has no tenant field.
    Unscoped,
    /// Policy applied; `rewritten` tells whether the arguments changed.
    Enforced { rewritten: bool },
}

pub struct TenantGuard {
    config: GuardConfig,
    registry: Arc<SchemaRegistry>,
    flag: Arc<dyn MultiTenancyFlag>,
    contexts: TenantContextProviderRef,
    observer: GuardObserverRef,
}

/// Per-call view shared by the policy steps.
struct Call<'a> {
    model: &'a str,
    action: GuardedAction,
    tenant: &'a str,
    privileged: bool,
    tenant_config: &'a ModelTenantConfig,
}

impl Call<'_> {
    fn field(&self) -> &str {
        &self.tenant_config.field
    }
}

impl TenantGuard {
    #[must_use]
    pub fn new(
        config: GuardConfig,
        registry: Arc<SchemaRegistry>,
        flag: Arc<dyn MultiTenancyFlag>,
        contexts: TenantContextProviderRef,
        observer: GuardObserverRef,
    ) -> Self {
        Self {
            config,
            registry,
            flag,
            contexts,
            observer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Apply the tenant policy to `op`, rewriting its arguments in place.
    ///
    /// # Errors
    /// Returns [`GuardError`] when the operation must not reach storage.
    pub fn enforce(&self, op: &mut Operation) -> Result<Verdict, GuardError> {
        if !self.flag.is_enabled() {
            return Ok(Verdict::Disabled);
        }
        if self.config.is_exempt_model(&op.model)
            || op
                .request_url
                .as_deref()
                .is_some_and(|url| self.config.is_auth_route(url))
        {
            return Ok(Verdict::Exempt);
        }
        let Some(tenant_config) = self.registry.get(&op.model) else {
            return Ok(Verdict::Unscoped);
        };

        let Some(ctx) = self
            .contexts
            .context_or_null()
            .filter(|ctx| !ctx.tenant_id().trim().is_empty())
        else {
            return Err(self.reject(
                GuardError::MissingTenantContext {
                    model: op.model.clone(),
                    action: op.action,
                },
                None,
            ));
        };

        let model = op.model.clone();
        let call = Call {
            model: &model,
            action: op.action,
            tenant: ctx.tenant_id(),
            privileged: ctx.is_super_admin(),
            tenant_config,
        };
        let rewritten = self.apply(&call, op)?;
        Ok(Verdict::Enforced { rewritten })
    }

    fn apply(&self, call: &Call<'_>, op: &mut Operation) -> Result<bool, GuardError> {
        let class = call.action.class();
        let mut rewritten = false;
        if !call.privileged {
            if class == ActionClass::WriteCreate {
                rewritten |= self.inject_tenant(call, op);
            }
            if call.action.is_filtered() || call.action == GuardedAction::Upsert {
                rewritten |= self.scope_filter(call, op);
            }
        }

        match class {
            ActionClass::WriteCreate => {
                self.check_create(call, op)?;
                if call.action == GuardedAction::Upsert {
                    self.check_single(call, op)?;
                }
            }
            ActionClass::BulkMutation => self.check_bulk(call, op)?,
            ActionClass::SingleMutation => self.check_single(call, op)?,
            ActionClass::Read => self.check_read(call, op),
        }
        Ok(rewritten)
    }

    /// Fill the tenant into create records that lack it. Returns whether
    /// any record changed.
    fn inject_tenant(&self, call: &Call<'_>, op: &mut Operation) -> bool {
        let Some(payload) = op.create_payload_mut() else {
            return false;
        };
        let records: Vec<&mut Value> = match payload {
            Value::Array(items) => items.iter_mut().collect(),
            record => vec![record],
        };

        let mut injected = false;
        for record in records {
            let Value::Object(fields) = record else {
                continue;
            };
            if fields.get(call.field()).is_none_or(Value::is_null) {
                fields.insert(call.field().to_owned(), Value::String(call.tenant.to_owned()));
                injected = true;
            }
        }
        if injected {
            self.emit(call, EventKind::AutoInjected, &[]);
        }
        injected
    }

    /// Narrow the filter to the request tenant unless every matching row is
    /// already pinned to exactly that tenant.
    fn scope_filter(&self, call: &Call<'_>, op: &mut Operation) -> bool {
        let existing = op.args.filter.take();
        let pinned = existing
            .as_ref()
            .and_then(|filter| pinned_tenant_values(filter, call.field()));
        if pinned.is_some_and(|ids| ids.len() == 1 && ids.contains(call.tenant)) {
            op.args.filter = existing;
            return false;
        }

        let provided: Vec<String> = existing
            .as_ref()
            .map(|filter| extract_tenant_values(filter, call.field()))
            .unwrap_or_default()
            .into_iter()
            .collect();
        let scope = Filter::equals(call.field(), call.tenant);
        op.args.filter = Some(match existing {
            Some(filter) if !filter.is_match_all() => Filter::And(vec![filter, scope]),
            _ => scope,
        });
        self.emit(call, EventKind::AutoScoped, &provided);
        true
    }

    fn check_create(&self, call: &Call<'_>, op: &Operation) -> Result<(), GuardError> {
        let malformed = || GuardError::MalformedCreatePayload {
            model: call.model.to_owned(),
            action: call.action,
        };
        let Some(payload) = op.create_payload() else {
            return Err(self.reject(malformed(), Some(call.tenant)));
        };
        let records: Vec<&Value> = match payload {
            Value::Array(items) => items.iter().collect(),
            record => vec![record],
        };

        for record in records {
            let Value::Object(fields) = record else {
                return Err(self.reject(malformed(), Some(call.tenant)));
            };
            let raw = fields.get(call.field());
            let ids = raw.map(value_tenant_values).unwrap_or_default();
            if ids.is_empty() {
                let absent = raw.is_none_or(Value::is_null);
                if call.tenant_config.optional && call.privileged && absent {
                    continue;
                }
                return Err(self.reject(
                    GuardError::MissingTenantOnCreate {
                        model: call.model.to_owned(),
                        action: call.action,
                    },
                    Some(call.tenant),
                ));
            }
            if call.privileged {
                continue;
            }
            if let Some(foreign) = ids.into_iter().find(|id| id != call.tenant) {
                return Err(self.reject(
                    GuardError::TenantMismatchOnCreate {
                        model: call.model.to_owned(),
                        action: call.action,
                        expected: call.tenant.to_owned(),
                        provided: foreign,
                    },
                    Some(call.tenant),
                ));
            }
        }
        Ok(())
    }

    fn check_bulk(&self, call: &Call<'_>, op: &Operation) -> Result<(), GuardError> {
        let ids = filter_tenant_values(op, call.field());
        if ids.is_empty() {
            return Err(self.reject(
                GuardError::MissingTenantScopeOnBulk {
                    model: call.model.to_owned(),
                    action: call.action,
                },
                Some(call.tenant),
            ));
        }
        if call.privileged {
            return Ok(());
        }
        let foreign = foreign_ids(&ids, call.tenant);
        if !foreign.is_empty() {
            return Err(self.reject(
                GuardError::TenantMismatchOnBulk {
                    model: call.model.to_owned(),
                    action: call.action,
                    expected: call.tenant.to_owned(),
                    provided: foreign,
                },
                Some(call.tenant),
            ));
        }
        self.check_reassignment(call, op)
    }

    fn check_single(&self, call: &Call<'_>, op: &Operation) -> Result<(), GuardError> {
        if call.privileged {
            return Ok(());
        }
        let foreign = foreign_ids(&filter_tenant_values(op, call.field()), call.tenant);
        if !foreign.is_empty() {
            return Err(self.mutation_mismatch(call, foreign));
        }
        self.check_reassignment(call, op)
    }

    /// An update payload must not hand rows over to another tenant.
    fn check_reassignment(&self, call: &Call<'_>, op: &Operation) -> Result<(), GuardError> {
        let payload = match call.action {
            GuardedAction::Upsert => op.args.update.as_ref(),
            GuardedAction::Update | GuardedAction::UpdateMany => op.args.data.as_ref(),
            _ => None,
        };
        let Some(Value::Object(fields)) = payload else {
            return Ok(());
        };
        let ids: BTreeSet<String> = fields
            .get(call.field())
            .map(value_tenant_values)
            .unwrap_or_default()
            .into_iter()
            .collect();
        let foreign = foreign_ids(&ids, call.tenant);
        if foreign.is_empty() {
            Ok(())
        } else {
            Err(self.mutation_mismatch(call, foreign))
        }
    }

    /// Only privileged reads can get here unscoped; they pass, but are reported.
    fn check_read(&self, call: &Call<'_>, op: &Operation) {
        if filter_tenant_values(op, call.field()).is_empty() {
            self.emit(call, EventKind::ReadWithoutTenant, &[]);
        }
    }

    fn mutation_mismatch(&self, call: &Call<'_>, foreign: Vec<String>) -> GuardError {
        self.reject(
            GuardError::TenantMismatchOnMutation {
                model: call.model.to_owned(),
                action: call.action,
                expected: call.tenant.to_owned(),
                provided: foreign,
            },
            Some(call.tenant),
        )
    }

    /// Report `err` and hand it back for returning.
    fn reject(&self, err: GuardError, tenant: Option<&str>) -> GuardError {
        let provided = err.provided();
        self.observe(&GuardEvent {
            kind: err.event_kind(),
            model: err.model(),
            action: err.action(),
            tenant_id: tenant,
            provided: &provided,
        });
        err
    }

    fn emit(&self, call: &Call<'_>, kind: EventKind, provided: &[String]) {
        self.observe(&GuardEvent {
            kind,
            model: call.model,
            action: call.action,
            tenant_id: Some(call.tenant),
            provided,
        });
    }

    fn observe(&self, event: &GuardEvent<'_>) {
        record_contained(self.observer.as_ref(), event);
    }
}

fn filter_tenant_values(op: &Operation, field: &str) -> BTreeSet<String> {
    op.args
        .filter
        .as_ref()
        .map(|filter| extract_tenant_values(filter, field))
        .unwrap_or_default()
}

fn foreign_ids(ids: &BTreeSet<String>, tenant: &str) -> Vec<String> {
    ids.iter().filter(|id| *id != tenant).cloned().collect()
}
