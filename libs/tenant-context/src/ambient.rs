//! Task-local storage for the current request's tenant context.
//!
//! The slot is a tokio task-local: a scope covers exactly the future (or
//! closure) handed to [`scope`] / [`sync_scope`] and is torn down on every
//! exit path, including panics and cancellation. Tasks spawned from inside a
//! scope do not inherit it; wrap their futures with [`in_current_scope`].

use std::future::Future;
use std::sync::Arc;

use crate::context::TenantContext;

tokio::task_local! {
    static CURRENT: Arc<TenantContext>;
}

/// Run `fut` with `ctx` as the current tenant context.
pub async fn scope<F>(ctx: TenantContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(Arc::new(ctx), fut).await
}

/// Run `f` synchronously with `ctx` as the current tenant context.
pub fn sync_scope<R>(ctx: TenantContext, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(Arc::new(ctx), f)
}

/// Returns the context of the current scope, or `None` outside any scope.
#[must_use]
pub fn context_or_null() -> Option<Arc<TenantContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// Bind `fut` to the caller's context so it keeps it after being spawned.
///
/// The context is captured when this function is called, not when the
/// returned future is first polled. Outside any scope the future runs
/// without a context, which makes guarded data access inside it fail closed.
pub fn in_current_scope<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let captured = context_or_null();
    async move {
        match captured {
            Some(ctx) => CURRENT.scope(ctx, fut).await,
            None => fut.await,
        }
    }
}
