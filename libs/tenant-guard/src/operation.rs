use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::GuardedAction;
use crate::filter::Filter;

/// One intercepted data operation, in the ORM's own shape:
///
/// ```json
/// { "model": "Invoice", "action": "findMany", "args": { "where": { "status": "PAID" } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub model: String,
    pub action: GuardedAction,
    #[serde(default)]
    pub args: OperationArgs,
    /// URL (or path) of the request that issued the operation, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
}

/// Operation arguments. Keys the guard does not inspect are kept in `extra`
/// and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationArgs {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Operation {
    #[must_use]
    pub fn new(model: impl Into<String>, action: GuardedAction) -> Self {
        Self {
            model: model.into(),
            action,
            args: OperationArgs::default(),
            request_url: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.args.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.args.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_create(mut self, create: Value) -> Self {
        self.args.create = Some(create);
        self
    }

    #[must_use]
    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = Some(url.into());
        self
    }

    /// Records a create-class action writes: `create` for upserts (falling
    /// back to `data`), `data` otherwise.
    #[must_use]
    pub fn create_payload(&self) -> Option<&Value> {
        match self.action {
            GuardedAction::Upsert => self.args.create.as_ref().or(self.args.data.as_ref()),
            _ => self.args.data.as_ref(),
        }
    }

    pub fn create_payload_mut(&mut self) -> Option<&mut Value> {
        match self.action {
            GuardedAction::Upsert if self.args.create.is_some() => self.args.create.as_mut(),
            _ => self.args.data.as_mut(),
        }
    }
}
