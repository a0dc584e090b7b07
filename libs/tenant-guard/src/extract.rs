//! Tenant-id extraction from filters and create payloads.
//!
//! Two views over the same [`Filter`]:
//!
//! - [`extract_tenant_values`] collects every tenant id a filter mentions,
//!   wherever it appears (`AND`, `OR`, `NOT`, tenant relations). Used to
//!   decide whether a filter references the tenant at all and whether any
//!   referenced tenant is foreign.
//! - [`pinned_tenant_values`] returns the tenant ids the filter is guaranteed
//!   to be restricted to on every conjunctive path, or `None` when some row
//!   could match without a tenant constraint (e.g. the tenant is only under
//!   `OR` or `NOT`). Used to decide whether auto-scoping is still needed.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::filter::{Condition, Filter};

/// Every tenant id `filter` constrains `tenant_field` to, deduplicated.
/// An empty set means the filter does not reference the tenant.
#[must_use]
pub fn extract_tenant_values(filter: &Filter, tenant_field: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect(filter, tenant_field, &mut out);
    out
}

/// Tenant ids a single field condition names.
#[must_use]
pub fn condition_tenant_values(condition: &Condition) -> Vec<String> {
    match condition {
        Condition::Equals(value) | Condition::Set(value) => tenant_string(value).into_iter().collect(),
        Condition::In(values) => values.iter().filter_map(tenant_string).collect(),
        Condition::All(conditions) => conditions.iter().flat_map(condition_tenant_values).collect(),
        Condition::Op(..) | Condition::Relation(_) => Vec::new(),
    }
}

/// Tenant ids carried by a raw record value (`"t-1"`, `{ "set": "t-1" }`, ...).
#[must_use]
pub fn value_tenant_values(value: &Value) -> Vec<String> {
    Condition::from_json(value)
        .map(|condition| condition_tenant_values(&condition))
        .unwrap_or_default()
}

/// Tenant ids every row matched by `filter` is restricted to, or `None`
/// when the filter leaves some path unconstrained.
#[must_use]
pub fn pinned_tenant_values(filter: &Filter, tenant_field: &str) -> Option<BTreeSet<String>> {
    match filter {
        Filter::Field(name, condition) if name == tenant_field => pinned_condition(condition),
        Filter::Field(name, Condition::Relation(nested)) if is_tenant_relation(name) => {
            pinned_tenant_values(nested, tenant_field)
        }
        Filter::And(children) => children
            .iter()
            .filter_map(|child| pinned_tenant_values(child, tenant_field))
            .reduce(|acc, next| acc.intersection(&next).cloned().collect()),
        Filter::Or(_) | Filter::Not(_) | Filter::Field(..) => None,
    }
}

fn collect(filter: &Filter, tenant_field: &str, out: &mut BTreeSet<String>) {
    match filter {
        Filter::And(children) | Filter::Or(children) => {
            for child in children {
                collect(child, tenant_field, out);
            }
        }
        Filter::Not(inner) => collect(inner, tenant_field, out),
        Filter::Field(name, condition) if name == tenant_field => {
            out.extend(condition_tenant_values(condition));
        }
        Filter::Field(name, Condition::Relation(nested)) if is_tenant_relation(name) => {
            collect(nested, tenant_field, out);
        }
        Filter::Field(..) => {}
    }
}

fn pinned_condition(condition: &Condition) -> Option<BTreeSet<String>> {
    match condition {
        Condition::Equals(value) | Condition::Set(value) => {
            tenant_string(value).map(|id| BTreeSet::from([id]))
        }
        Condition::In(values) => Some(values.iter().filter_map(tenant_string).collect()),
        Condition::All(conditions) => conditions
            .iter()
            .filter_map(pinned_condition)
            .reduce(|acc, next| acc.intersection(&next).cloned().collect()),
        Condition::Op(..) | Condition::Relation(_) => None,
    }
}

/// Relation traversal heuristic: any key mentioning "tenant".
fn is_tenant_relation(name: &str) -> bool {
    name.to_ascii_lowercase().contains("tenant")
}

fn tenant_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
}
