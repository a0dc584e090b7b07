use std::fmt;

/// Data operations the guard understands, named as the ORM names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardedAction {
    Create,
    CreateMany,
    Upsert,
    UpdateMany,
    DeleteMany,
    Update,
    Delete,
    FindFirst,
    FindFirstOrThrow,
    FindUnique,
    FindUniqueOrThrow,
    FindMany,
    Aggregate,
    Count,
    GroupBy,
}

/// Disjoint classes the guard applies a policy to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// `create`, `createMany`, `upsert`
    WriteCreate,
    /// `updateMany`, `deleteMany`
    BulkMutation,
    /// `update`, `delete`
    SingleMutation,
    Read,
}

impl GuardedAction {
    pub const ALL: [Self; 15] = [
        Self::Create,
        Self::CreateMany,
        Self::Upsert,
        Self::UpdateMany,
        Self::DeleteMany,
        Self::Update,
        Self::Delete,
        Self::FindFirst,
        Self::FindFirstOrThrow,
        Self::FindUnique,
        Self::FindUniqueOrThrow,
        Self::FindMany,
        Self::Aggregate,
        Self::Count,
        Self::GroupBy,
    ];

    #[must_use]
    pub const fn class(self) -> ActionClass {
        match self {
            Self::Create | Self::CreateMany | Self::Upsert => ActionClass::WriteCreate,
            Self::UpdateMany | Self::DeleteMany => ActionClass::BulkMutation,
            Self::Update | Self::Delete => ActionClass::SingleMutation,
            Self::FindFirst
            | Self::FindFirstOrThrow
            | Self::FindUnique
            | Self::FindUniqueOrThrow
            | Self::FindMany
            | Self::Aggregate
            | Self::Count
            | Self::GroupBy => ActionClass::Read,
        }
    }

    /// Wire name, identical to the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateMany => "createMany",
            Self::Upsert => "upsert",
            Self::UpdateMany => "updateMany",
            Self::DeleteMany => "deleteMany",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::FindFirst => "findFirst",
            Self::FindFirstOrThrow => "findFirstOrThrow",
            Self::FindUnique => "findUnique",
            Self::FindUniqueOrThrow => "findUniqueOrThrow",
            Self::FindMany => "findMany",
            Self::Aggregate => "aggregate",
            Self::Count => "count",
            Self::GroupBy => "groupBy",
        }
    }

    /// Whether the action filters existing rows through a `where` clause.
    #[must_use]
    pub const fn is_filtered(self) -> bool {
        !matches!(self.class(), ActionClass::WriteCreate)
    }
}

impl fmt::Display for GuardedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_classes_are_disjoint_and_complete() {
        let count = |class| {
            GuardedAction::ALL
                .iter()
                .filter(|a| a.class() == class)
                .count()
        };
        assert_eq!(count(ActionClass::WriteCreate), 3);
        assert_eq!(count(ActionClass::BulkMutation), 2);
        assert_eq!(count(ActionClass::SingleMutation), 2);
        assert_eq!(count(ActionClass::Read), 8);
    }

    #[test]
    fn test_wire_names_match_serde() {
        for action in GuardedAction::ALL {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, serde_json::Value::from(action.as_str()));
            let back: GuardedAction = serde_json::from_value(json).unwrap();
            assert_eq!(back, action);
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let res: Result<GuardedAction, _> = serde_json::from_str("\"executeRaw\"");
        assert!(res.is_err());
    }
}
