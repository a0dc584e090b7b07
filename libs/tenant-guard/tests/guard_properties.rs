#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end behaviour of the guard for regular users, super admins and
//! requests without a tenant.

mod common;

use std::sync::Arc;

use serde_json::{Value, json};
use tenant_context::{FixedContext, TenantContext};
use tenant_guard::{
    EventKind, Filter, GuardConfig, GuardError, GuardSetup, GuardedAction, MetricsObserver,
    Observers, Operation, TenantGuard, Verdict,
};

use common::{RecordingStore, harness, super_admin, user};

fn guard_with(ctx: Option<TenantContext>) -> (TenantGuard, Arc<common::RecordingObserver>) {
    let provider = ctx.map_or_else(FixedContext::none, FixedContext::new);
    let h = harness(Arc::new(provider));
    (h.setup.guard_for(&common::schema()), h.observer)
}

fn op(model: &str, action: GuardedAction, args: &Value) -> Operation {
    serde_json::from_value(json!({ "model": model, "action": action, "args": args })).unwrap()
}

fn where_json(op: &Operation) -> Value {
    op.args.filter.as_ref().map(Filter::to_json).unwrap()
}

#[test]
fn create_gets_tenant_injected() {
    let (guard, observer) = guard_with(Some(user("tenant-A")));
    let mut op = op("Invoice", GuardedAction::Create, &json!({ "data": { "status": "DRAFT" } }));

    let verdict = guard.enforce(&mut op).unwrap();

    assert_eq!(verdict, Verdict::Enforced { rewritten: true });
    assert_eq!(
        op.args.data,
        Some(json!({ "status": "DRAFT", "tenantId": "tenant-A" }))
    );
    assert_eq!(observer.kinds(), [EventKind::AutoInjected]);
}

#[test]
fn create_for_other_tenant_is_blocked() {
    let (guard, observer) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::Create,
        &json!({ "data": { "status": "DRAFT", "tenantId": "tenant-B" } }),
    );

    let err = guard.enforce(&mut op).unwrap_err();

    assert_eq!(
        err,
        GuardError::TenantMismatchOnCreate {
            model: "Invoice".to_owned(),
            action: GuardedAction::Create,
            expected: "tenant-A".to_owned(),
            provided: "tenant-B".to_owned(),
        }
    );
    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::CreateMismatch);
    assert_eq!(events[0].provided, ["tenant-B"]);
}

#[test]
fn super_admin_create_without_required_tenant_is_blocked() {
    let (guard, observer) = guard_with(Some(super_admin("tenant-A")));
    let mut op = op("Invoice", GuardedAction::Create, &json!({ "data": { "status": "DRAFT" } }));

    assert!(matches!(
        guard.enforce(&mut op),
        Err(GuardError::MissingTenantOnCreate { .. })
    ));
    assert_eq!(observer.kinds(), [EventKind::CreateMissingTenant]);
}

#[test]
fn super_admin_may_create_for_any_tenant_or_none_when_optional() {
    let (guard, observer) = guard_with(Some(super_admin("tenant-A")));
    let mut foreign = op(
        "Invoice",
        GuardedAction::Create,
        &json!({ "data": { "tenantId": "tenant-B" } }),
    );
    let mut global_user = op(
        "User",
        GuardedAction::Create,
        &json!({ "data": { "email": "root@example.com", "tenantId": null } }),
    );

    assert!(guard.enforce(&mut foreign).is_ok());
    assert!(guard.enforce(&mut global_user).is_ok());
    assert_eq!(global_user.args.data.unwrap()["tenantId"], Value::Null);
    assert!(observer.events().is_empty());
}

#[test]
fn super_admin_bulk_without_tenant_scope_is_blocked() {
    let (guard, observer) = guard_with(Some(super_admin("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::UpdateMany,
        &json!({ "where": { "status": "PAID" }, "data": { "status": "ARCHIVED" } }),
    );

    let err = guard.enforce(&mut op).unwrap_err();

    assert!(matches!(err, GuardError::MissingTenantScopeOnBulk { .. }));
    assert_eq!(observer.kinds(), [EventKind::BulkMissingScope]);
}

#[test]
fn regular_bulk_without_tenant_scope_is_scoped() {
    let (guard, observer) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::UpdateMany,
        &json!({ "where": { "status": "PAID" }, "data": { "status": "ARCHIVED" } }),
    );

    guard.enforce(&mut op).unwrap();

    assert_eq!(
        where_json(&op),
        json!({ "status": "PAID", "tenantId": "tenant-A" })
    );
    assert_eq!(observer.kinds(), [EventKind::AutoScoped]);
}

#[test]
fn bulk_for_other_tenant_is_blocked() {
    let (guard, observer) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::DeleteMany,
        &json!({ "where": { "tenantId": "tenant-B" } }),
    );

    let err = guard.enforce(&mut op).unwrap_err();

    assert!(matches!(
        &err,
        GuardError::TenantMismatchOnBulk { expected, provided, .. }
            if expected == "tenant-A" && provided == &["tenant-B"]
    ));
    assert_eq!(observer.count(EventKind::BulkMismatch), 1);
    assert_eq!(observer.kinds().last(), Some(&EventKind::BulkMismatch));
}

#[test]
fn bulk_with_tenant_hidden_in_or_is_blocked() {
    let (guard, _) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::DeleteMany,
        &json!({ "where": { "OR": [{ "tenantId": "tenant-A" }, { "tenantId": "tenant-B" }] } }),
    );

    assert!(matches!(
        guard.enforce(&mut op),
        Err(GuardError::TenantMismatchOnBulk { .. })
    ));
}

#[test]
fn single_mutation_for_other_tenant_is_blocked() {
    let (guard, observer) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::Update,
        &json!({ "where": { "id": "x", "tenantId": "tenant-B" }, "data": { "status": "PAID" } }),
    );

    let err = guard.enforce(&mut op).unwrap_err();

    assert!(matches!(err, GuardError::TenantMismatchOnMutation { .. }));
    assert_eq!(err.provided(), ["tenant-B"]);
    assert_eq!(observer.count(EventKind::MutationMismatch), 1);
}

#[test]
fn single_mutation_through_tenant_relation_is_checked() {
    let (guard, _) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::Delete,
        &json!({ "where": { "id": "x", "tenant": { "tenantId": "tenant-B" } } }),
    );

    assert!(matches!(
        guard.enforce(&mut op),
        Err(GuardError::TenantMismatchOnMutation { .. })
    ));
}

#[test]
fn single_mutation_gets_scoped() {
    let (guard, _) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::Delete,
        &json!({ "where": { "id": "x" } }),
    );

    guard.enforce(&mut op).unwrap();

    assert_eq!(where_json(&op), json!({ "id": "x", "tenantId": "tenant-A" }));
}

#[test]
fn read_without_filter_is_scoped() {
    let (guard, observer) = guard_with(Some(user("tenant-A")));
    let mut op = op("Invoice", GuardedAction::FindMany, &json!({}));

    guard.enforce(&mut op).unwrap();

    assert_eq!(where_json(&op), json!({ "tenantId": "tenant-A" }));
    assert_eq!(observer.kinds(), [EventKind::AutoScoped]);
}

#[test]
fn read_with_empty_filter_is_scoped() {
    let (guard, _) = guard_with(Some(user("tenant-A")));
    let mut op = op("Invoice", GuardedAction::Count, &json!({ "where": {} }));

    guard.enforce(&mut op).unwrap();

    assert_eq!(where_json(&op), json!({ "tenantId": "tenant-A" }));
}

#[test]
fn read_filtered_on_foreign_tenant_is_narrowed_to_nothing() {
    let (guard, observer) = guard_with(Some(user("tenant-A")));
    let mut op = op(
        "Invoice",
        GuardedAction::FindMany,
        &json!({ "where": { "tenantId": "tenant-B" } }),
    );

    let verdict = guard.enforce(&mut op).unwrap();

    assert_eq!(verdict, Verdict::Enforced { rewritten: true });
    assert_eq!(
        where_json(&op),
        json!({ "AND": [{ "tenantId": "tenant-B" }, { "tenantId": "tenant-A" }] })
    );
    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::AutoScoped);
    assert_eq!(events[0].provided, ["tenant-B"]);
}

#[tokio::test]
async fn read_excluding_several_values_keeps_not_list() {
    let h = harness(Arc::new(FixedContext::new(user("tenant-A"))));
    let store = RecordingStore::new();
    let seen = store.seen.clone();
    let client = h.setup.register(store);

    client
        .execute(op(
            "Invoice",
            GuardedAction::FindMany,
            &json!({ "where": { "NOT": [{ "status": "VOID" }, { "status": "DRAFT" }] } }),
        ))
        .await
        .unwrap();

    let sent = seen.lock()[0].clone();
    assert_eq!(
        serde_json::to_value(&sent.args).unwrap()["where"],
        json!({
            "NOT": [{ "status": "VOID" }, { "status": "DRAFT" }],
            "tenantId": "tenant-A",
        })
    );
}

#[test]
fn super_admin_unscoped_read_passes_with_warning() {
    let (guard, observer) = guard_with(Some(super_admin("tenant-A")));
    let mut op = op("Invoice", GuardedAction::FindMany, &json!({}));
    let before = op.clone();

    let verdict = guard.enforce(&mut op).unwrap();

    assert_eq!(verdict, Verdict::Enforced { rewritten: false });
    assert_eq!(op, before);
    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::ReadWithoutTenant);
    assert_eq!(events[0].tenant_id.as_deref(), Some("tenant-A"));
}

#[test]
fn super_admin_unscoped_read_increments_counter() {
    let registry = prometheus::Registry::new();
    let metrics = MetricsObserver::register(&registry).unwrap();
    let provider = Arc::new(FixedContext::new(super_admin("tenant-A")));
    let guard = harness(provider)
        .setup
        .with_observer(Arc::new(Observers::new().with(metrics.clone())))
        .guard_for(&common::schema());

    let mut op = op("Invoice", GuardedAction::FindMany, &json!({}));
    guard.enforce(&mut op).unwrap();

    assert_eq!(
        metrics.count(EventKind::ReadWithoutTenant, "Invoice", GuardedAction::FindMany),
        1
    );
}

#[test]
fn blocked_bulk_increments_error_counter() {
    let registry = prometheus::Registry::new();
    let metrics = MetricsObserver::register(&registry).unwrap();
    let guard = GuardSetup::new(GuardConfig {
        enabled: true,
        ..GuardConfig::default()
    })
    .with_context_provider(Arc::new(FixedContext::new(user("tenant-A"))))
    .with_metrics(metrics.clone())
    .guard_for(&common::schema());

    let mut op = op(
        "Invoice",
        GuardedAction::DeleteMany,
        &json!({ "where": { "tenantId": "tenant-B" } }),
    );
    assert!(matches!(
        guard.enforce(&mut op),
        Err(GuardError::TenantMismatchOnBulk { .. })
    ));

    assert_eq!(
        metrics.count(EventKind::BulkMismatch, "Invoice", GuardedAction::DeleteMany),
        1
    );
    assert_eq!(
        metrics.count(EventKind::AutoScoped, "Invoice", GuardedAction::DeleteMany),
        1
    );
}

#[test]
fn default_setup_counts_blocks() {
    let guard = GuardSetup::new(GuardConfig {
        enabled: true,
        ..GuardConfig::default()
    })
    .with_context_provider(Arc::new(FixedContext::none()))
    .guard_for(&common::schema());
    let metrics = MetricsObserver::process().unwrap();
    let before = metrics.count(EventKind::MissingContext, "Invoice", GuardedAction::Upsert);

    let mut op = op("Invoice", GuardedAction::Upsert, &json!({ "create": {} }));
    assert!(matches!(
        guard.enforce(&mut op),
        Err(GuardError::MissingTenantContext { .. })
    ));

    assert_eq!(
        metrics.count(EventKind::MissingContext, "Invoice", GuardedAction::Upsert),
        before + 1
    );
}

#[test]
fn exempt_models_pass_with_or_without_context() {
    for ctx in [None, Some(user("tenant-A"))] {
        let (guard, observer) = guard_with(ctx);
        let mut op = op("Account", GuardedAction::FindMany, &json!({ "where": { "userId": "u" } }));
        let before = op.clone();

        assert_eq!(guard.enforce(&mut op), Ok(Verdict::Exempt));
        assert_eq!(op, before);
        assert!(observer.events().is_empty());
    }
}

#[test]
fn auth_routes_are_exempt() {
    let (guard, _) = guard_with(None);
    let mut op = op("Invoice", GuardedAction::FindMany, &json!({}))
        .with_request_url("https://app.example.com/api/auth/callback/google");

    assert_eq!(guard.enforce(&mut op), Ok(Verdict::Exempt));
}

#[test]
fn models_without_tenant_field_are_unguarded() {
    let (guard, _) = guard_with(None);
    let mut op = op("Tag", GuardedAction::DeleteMany, &json!({}));

    assert_eq!(guard.enforce(&mut op), Ok(Verdict::Unscoped));
    assert!(op.args.filter.is_none());
}

#[test]
fn missing_context_fails_closed() {
    let (guard, observer) = guard_with(None);
    for action in GuardedAction::ALL {
        let mut op = op("Invoice", action, &json!({ "data": {} }));
        assert!(matches!(
            guard.enforce(&mut op),
            Err(GuardError::MissingTenantContext { .. })
        ));
    }
    assert_eq!(
        observer.count(EventKind::MissingContext),
        GuardedAction::ALL.len()
    );
    assert!(observer.events().iter().all(|e| e.tenant_id.is_none()));
}

#[test]
fn feature_flag_off_passes_everything() {
    let h = harness(Arc::new(FixedContext::none()));
    h.switch.set_enabled(false);
    let guard = h.setup.guard_for(&common::schema());

    for action in GuardedAction::ALL {
        let mut op = op("Invoice", action, &json!({ "where": { "tenantId": "tenant-B" } }));
        let before = op.clone();
        assert_eq!(guard.enforce(&mut op), Ok(Verdict::Disabled));
        assert_eq!(op, before);
    }
    assert!(h.observer.events().is_empty());
}

#[test]
fn panicking_observer_does_not_fail_operation() {
    struct Exploding;
    impl tenant_guard::GuardObserver for Exploding {
        fn record(&self, _event: &tenant_guard::GuardEvent<'_>) {
            panic!("metrics backend down");
        }
    }

    let guard = harness(Arc::new(FixedContext::new(user("tenant-A"))))
        .setup
        .with_observer(Arc::new(Exploding))
        .guard_for(&common::schema());

    let mut read = op("Invoice", GuardedAction::FindMany, &json!({}));
    assert!(guard.enforce(&mut read).is_ok());

    let mut blocked = op("Invoice", GuardedAction::DeleteMany, &json!({ "where": { "tenantId": "tenant-B" } }));
    assert!(matches!(
        guard.enforce(&mut blocked),
        Err(GuardError::TenantMismatchOnBulk { .. })
    ));
}

#[tokio::test]
async fn blocked_operation_never_reaches_storage() {
    let h = harness(Arc::new(FixedContext::new(user("tenant-A"))));
    let store = RecordingStore::new();
    let calls = store.calls.clone();
    let client = h.setup.register(store);

    let result = client
        .execute(op(
            "Invoice",
            GuardedAction::Create,
            &json!({ "data": { "tenantId": "tenant-B" } }),
        ))
        .await;

    let err = result.unwrap_err();
    assert!(matches!(
        err.as_guard(),
        Some(GuardError::TenantMismatchOnCreate { .. })
    ));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}
