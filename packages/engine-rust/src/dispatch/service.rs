//! Tower adapter: exposes a registry as a `tower::Service`.
//!
//! Lets name-based dispatch sit behind standard Tower middleware (timeouts,
//! concurrency limits, load shedding) or inside a transport layer.

use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

use opkit_core::{ExecutionContext, Value};
use tower::Service;

use super::operation::DispatchError;
use super::registry::Registry;

/// One name-based call.
#[derive(Debug)]
pub struct Invocation {
    pub operation: String,
    pub input: Value,
    pub ctx: ExecutionContext,
}

impl Invocation {
    #[must_use]
    pub fn new(operation: impl Into<String>, input: impl Into<Value>) -> Self {
        Self {
            operation: operation.into(),
            input: input.into(),
            ctx: ExecutionContext::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }
}

/// `tower::Service<Invocation>` over a shared registry.
///
/// Always ready. Calls run synchronously inside `call` and resolve
/// immediately.
#[derive(Debug, Clone)]
pub struct DispatchService {
    registry: Arc<Registry>,
}

impl DispatchService {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl Service<Invocation> for DispatchService {
    type Response = Value;
    type Error = DispatchError;
    type Future = Ready<Result<Value, DispatchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Invocation) -> Self::Future {
        ready(self.registry.invoke(req.ctx, &req.operation, req.input))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use opkit_core::describe_struct;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::Operation;

    describe_struct! {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct Count {
            pub items: Vec<String>,
        }
    }

    describe_struct! {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct Total {
            pub total: u64,
        }
    }

    fn service() -> DispatchService {
        let registry = Registry::builder()
            .register(
                Operation::from_fn(|_, input: &Count| {
                    Ok(Total {
                        total: input.items.len() as u64,
                    })
                })
                .with_operation("count")
                .build(),
            )
            .build();
        DispatchService::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn oneshot_dispatches_by_name() {
        let out = service()
            .oneshot(Invocation::new("count", json!({"items": ["a", "b", "c"]})))
            .await
            .unwrap();
        assert_eq!(serde_json::Value::from(out), json!({"total": 3}));
    }

    #[tokio::test]
    async fn unknown_operation_is_not_found() {
        let err = service()
            .oneshot(Invocation::new("nope", json!({})))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn expired_deadline_is_cancelled() {
        let ctx = ExecutionContext::new().with_timeout(Duration::ZERO);
        let err = service()
            .oneshot(Invocation::new("count", json!({"items": ["a"]})).with_context(ctx))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn clones_share_the_registry() {
        let svc = service();
        let clone = svc.clone();
        assert!(Arc::ptr_eq(svc.registry(), clone.registry()));
        let out = clone
            .oneshot(Invocation::new("count", json!({"items": []})))
            .await
            .unwrap();
        assert_eq!(out.get("total"), Some(&Value::Int(0)));
    }
}
