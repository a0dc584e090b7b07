use crate::action::GuardedAction;
use crate::observe::EventKind;

/// Operations the guard refuses to forward to storage.
///
/// Every variant is fail-closed; callers should surface them as internal
/// errors rather than retrying.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("tenant context required for {action} on {model}")]
    MissingTenantContext { model: String, action: GuardedAction },

    #[error("tenant id missing on {action} of {model}")]
    MissingTenantOnCreate { model: String, action: GuardedAction },

    #[error("{action} on {model} writes tenant `{provided}`, request tenant is `{expected}`")]
    TenantMismatchOnCreate {
        model: String,
        action: GuardedAction,
        expected: String,
        provided: String,
    },

    #[error("{action} payload for {model} must be an object or an array of objects")]
    MalformedCreatePayload { model: String, action: GuardedAction },

    #[error("{action} on {model} requires a tenant constraint in its filter")]
    MissingTenantScopeOnBulk { model: String, action: GuardedAction },

    #[error(
        "{action} on {model} targets tenants [{ids}], request tenant is `{expected}`",
        ids = .provided.join(", ")
    )]
    TenantMismatchOnBulk {
        model: String,
        action: GuardedAction,
        expected: String,
        provided: Vec<String>,
    },

    #[error(
        "{action} on {model} targets tenants [{ids}], request tenant is `{expected}`",
        ids = .provided.join(", ")
    )]
    TenantMismatchOnMutation {
        model: String,
        action: GuardedAction,
        expected: String,
        provided: Vec<String>,
    },
}

impl GuardError {
    /// Observer event emitted when this error blocks an operation.
    #[must_use]
    pub const fn event_kind(&self) -> EventKind {
        match self {
            Self::MissingTenantContext { .. } => EventKind::MissingContext,
            Self::MissingTenantOnCreate { .. } => EventKind::CreateMissingTenant,
            Self::TenantMismatchOnCreate { .. } => EventKind::CreateMismatch,
            Self::MalformedCreatePayload { .. } => EventKind::CreateMalformed,
            Self::MissingTenantScopeOnBulk { .. } => EventKind::BulkMissingScope,
            Self::TenantMismatchOnBulk { .. } => EventKind::BulkMismatch,
            Self::TenantMismatchOnMutation { .. } => EventKind::MutationMismatch,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::MissingTenantContext { model, .. }
            | Self::MissingTenantOnCreate { model, .. }
            | Self::TenantMismatchOnCreate { model, .. }
            | Self::MalformedCreatePayload { model, .. }
            | Self::MissingTenantScopeOnBulk { model, .. }
            | Self::TenantMismatchOnBulk { model, .. }
            | Self::TenantMismatchOnMutation { model, .. } => model,
        }
    }

    #[must_use]
    pub const fn action(&self) -> GuardedAction {
        match self {
            Self::MissingTenantContext { action, .. }
            | Self::MissingTenantOnCreate { action, .. }
            | Self::TenantMismatchOnCreate { action, .. }
            | Self::MalformedCreatePayload { action, .. }
            | Self::MissingTenantScopeOnBulk { action, .. }
            | Self::TenantMismatchOnBulk { action, .. }
            | Self::TenantMismatchOnMutation { action, .. } => *action,
        }
    }

    /// Tenant ids the blocked operation named, if any.
    #[must_use]
    pub fn provided(&self) -> Vec<String> {
        match self {
            Self::TenantMismatchOnCreate { provided, .. } => vec![provided.clone()],
            Self::TenantMismatchOnBulk { provided, .. }
            | Self::TenantMismatchOnMutation { provided, .. } => provided.clone(),
            _ => Vec::new(),
        }
    }
}

/// Failure of a guarded storage call.
#[derive(thiserror::Error, Debug)]
pub enum ClientError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("storage error: {0}")]
    Storage(#[source] E),
}

impl<E> ClientError<E>
where
    E: std::error::Error + 'static,
{
    #[must_use]
    pub const fn as_guard(&self) -> Option<&GuardError> {
        match self {
            Self::Guard(err) => Some(err),
            Self::Storage(_) => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let err = GuardError::TenantMismatchOnBulk {
            model: "Invoice".to_owned(),
            action: GuardedAction::DeleteMany,
            expected: "tenant-A".to_owned(),
            provided: vec!["tenant-B".to_owned()],
        };
        assert_eq!(err.model(), "Invoice");
        assert_eq!(err.action(), GuardedAction::DeleteMany);
        assert_eq!(err.event_kind(), EventKind::BulkMismatch);
        assert_eq!(err.provided(), ["tenant-B"]);
        assert_eq!(
            err.to_string(),
            "deleteMany on Invoice targets tenants [tenant-B], request tenant is `tenant-A`"
        );
    }

    #[test]
    fn test_client_error_wraps_guard_error() {
        let err: ClientError<std::io::Error> = GuardError::MissingTenantContext {
            model: "Invoice".to_owned(),
            action: GuardedAction::FindMany,
        }
        .into();
        assert!(err.as_guard().is_some());
        assert_eq!(
            err.to_string(),
            "tenant context required for findMany on Invoice"
        );
    }
}
