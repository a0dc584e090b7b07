use std::convert::Infallible;

use async_trait::async_trait;
use tenant_guard::{Operation, SchemaDescription, StorageClient};

/// Storage that executes nothing and returns the operation it was given,
/// so the caller can see what the guard would have sent.
pub struct DryRunStore {
    schema: SchemaDescription,
}

impl DryRunStore {
    #[must_use]
    pub fn new(schema: SchemaDescription) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl StorageClient for DryRunStore {
    type Output = Operation;
    type Error = Infallible;

    fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    async fn execute(&self, op: Operation) -> Result<Operation, Infallible> {
        tracing::debug!(model = %op.model, action = %op.action, "dry run, not executed");
        Ok(op)
    }
}
