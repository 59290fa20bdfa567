//! Before/after hooks around an agent execution.
//!
//! Hook failures never reach the caller: a failing `before` hook leaves the
//! original context in place and a failing `after` hook leaves the original
//! response in place. Failures of the wrapped execution always propagate.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use agent_primitives::{AgentMetadata, RequestContext, ResponseEnvelope};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Result alias for middleware hooks.
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;

/// Error returned by a middleware hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiddlewareError {
    /// The hook could not complete.
    #[error("middleware hook failed: {reason}")]
    Hook {
        /// Human-readable reason.
        reason: String,
    },
}

impl MiddlewareError {
    /// Creates a hook failure.
    #[must_use]
    pub fn hook(reason: impl Into<String>) -> Self {
        Self::Hook {
            reason: reason.into(),
        }
    }
}

/// Optional hooks an agent implementation can attach to its executions.
///
/// Both hooks default to identity.
#[async_trait]
pub trait AgentMiddleware: Send + Sync {
    /// Runs before the execution and may return a replacement context.
    async fn before(
        &self,
        ctx: RequestContext,
        _agent: &AgentMetadata,
    ) -> MiddlewareResult<RequestContext> {
        Ok(ctx)
    }

    /// Runs after a successful execution and may enrich the response.
    async fn after(
        &self,
        _ctx: &RequestContext,
        response: ResponseEnvelope,
        _agent: &AgentMetadata,
    ) -> MiddlewareResult<ResponseEnvelope> {
        Ok(response)
    }
}

/// Middleware registered per agent name.
#[derive(Default)]
pub struct MiddlewarePipeline {
    hooks: RwLock<HashMap<String, Arc<dyn AgentMiddleware>>>,
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let agents: Vec<String> = self
            .hooks
            .read()
            .map(|hooks| hooks.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("MiddlewarePipeline")
            .field("agents", &agents)
            .finish()
    }
}

impl MiddlewarePipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `middleware` to `agent`, replacing any previous one.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn register(&self, agent: impl Into<String>, middleware: Arc<dyn AgentMiddleware>) {
        let agent = agent.into();
        debug!(agent = %agent, "middleware registered");
        self.hooks
            .write()
            .expect("middleware pipeline poisoned")
            .insert(agent, middleware);
    }

    /// Returns the middleware attached to `agent`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn get(&self, agent: &str) -> Option<Arc<dyn AgentMiddleware>> {
        self.hooks
            .read()
            .expect("middleware pipeline poisoned")
            .get(agent)
            .cloned()
    }

    /// Runs `core` wrapped by the agent's hooks.
    ///
    /// `core` receives the context produced by the `before` hook.
    ///
    /// # Errors
    ///
    /// Returns whatever error `core` returns, after logging it.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub async fn run<F, Fut, E>(
        &self,
        ctx: RequestContext,
        agent: &AgentMetadata,
        core: F,
    ) -> Result<ResponseEnvelope, E>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = Result<ResponseEnvelope, E>>,
        E: fmt::Display,
    {
        let Some(middleware) = self.get(agent.name()) else {
            return core(ctx).await.inspect_err(|err| {
                error!(agent = %agent.name(), error = %err, "agent execution failed");
            });
        };

        let ctx = match middleware.before(ctx.clone(), agent).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(agent = %agent.name(), error = %err, "before hook failed; using original context");
                ctx
            }
        };

        let response = core(ctx.clone()).await.inspect_err(|err| {
            error!(agent = %agent.name(), error = %err, "agent execution failed");
        })?;

        match middleware.after(&ctx, response.clone(), agent).await {
            Ok(enriched) => Ok(enriched),
            Err(err) => {
                warn!(agent = %agent.name(), error = %err, "after hook failed; using original response");
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn agent(name: &str) -> AgentMetadata {
        AgentMetadata::builder().name(name).unwrap().build().unwrap()
    }

    async fn echo(ctx: RequestContext) -> Result<ResponseEnvelope, MiddlewareError> {
        Ok(ResponseEnvelope::new(ctx.input()))
    }

    struct Shouting;

    #[async_trait]
    impl AgentMiddleware for Shouting {
        async fn before(
            &self,
            ctx: RequestContext,
            _agent: &AgentMetadata,
        ) -> MiddlewareResult<RequestContext> {
            let input = ctx.input().to_uppercase();
            Ok(ctx.with_input(input))
        }

        async fn after(
            &self,
            _ctx: &RequestContext,
            response: ResponseEnvelope,
            agent: &AgentMetadata,
        ) -> MiddlewareResult<ResponseEnvelope> {
            Ok(response.with_metadata("wrapped_by", Value::from(agent.name())))
        }
    }

    struct Broken;

    #[async_trait]
    impl AgentMiddleware for Broken {
        async fn before(
            &self,
            _ctx: RequestContext,
            _agent: &AgentMetadata,
        ) -> MiddlewareResult<RequestContext> {
            Err(MiddlewareError::hook("before exploded"))
        }

        async fn after(
            &self,
            _ctx: &RequestContext,
            _response: ResponseEnvelope,
            _agent: &AgentMetadata,
        ) -> MiddlewareResult<ResponseEnvelope> {
            Err(MiddlewareError::hook("after exploded"))
        }
    }

    struct Identity;

    impl AgentMiddleware for Identity {}

    #[tokio::test]
    async fn hooks_transform_context_and_response() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.register("calc", Arc::new(Shouting));

        let response = pipeline
            .run(RequestContext::new("hello"), &agent("calc"), echo)
            .await
            .unwrap();

        assert_eq!(response.output(), "HELLO");
        assert_eq!(response.metadata_value("wrapped_by"), Some(&Value::from("calc")));
    }

    #[tokio::test]
    async fn failing_hooks_degrade_to_identity() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.register("calc", Arc::new(Broken));

        let response = pipeline
            .run(RequestContext::new("hello"), &agent("calc"), echo)
            .await
            .unwrap();

        assert_eq!(response.output(), "hello");
        assert!(response.metadata().is_empty());
    }

    #[tokio::test]
    async fn default_hooks_are_identity() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.register("calc", Arc::new(Identity));

        let response = pipeline
            .run(RequestContext::new("hello"), &agent("calc"), echo)
            .await
            .unwrap();
        assert_eq!(response, ResponseEnvelope::new("hello"));
    }

    #[tokio::test]
    async fn core_failure_propagates() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.register("calc", Arc::new(Shouting));

        let err = pipeline
            .run(RequestContext::new("hello"), &agent("calc"), |_ctx| async {
                Err::<ResponseEnvelope, _>(MiddlewareError::hook("core down"))
            })
            .await
            .unwrap_err();
        assert_eq!(err, MiddlewareError::hook("core down"));
    }

    #[tokio::test]
    async fn agents_without_middleware_run_core_directly() {
        let pipeline = MiddlewarePipeline::new();
        pipeline.register("other", Arc::new(Shouting));

        let response = pipeline
            .run(RequestContext::new("hello"), &agent("calc"), echo)
            .await
            .unwrap();
        assert_eq!(response.output(), "hello");
    }
}
