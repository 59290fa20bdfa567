//! Top-level request execution.
//!
//! [`ExecutionOrchestrator::execute`] is the single entry point. Admission
//! failures come back as [`ExecuteError`]; every later failure is folded
//! into a degraded [`ResponseEnvelope`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_adapters::ModelAdapter;
use agent_config::RuntimeConfig;
use agent_policy::{AdmissionGate, AuthError, PolicyResult, Rejection};
use agent_primitives::{AgentMetadata, AgentRecord, InstanceHandle, RequestContext, ResponseEnvelope};
use agent_prompts::{SystemPrompt, ToolSummary};
use agent_tools::{ParameterResolver, Registry, Tool, ToolMetadata, ToolRecord};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::{EventBus, LifecycleEvent};
use crate::fallback::FallbackDispatcher;
use crate::middleware::{AgentMiddleware, MiddlewarePipeline};
use crate::orchestration::{
    AdapterOrchestrator, ModelOrchestrator, OrchestrationError, OrchestrationRequest,
};
use crate::phase::{PhaseEvent, RequestLifecycle};
use crate::tool_adapter::ToolAdapter;

/// Output of a degraded response.
pub const DEGRADED_APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request.";

/// Terminal rejections surfaced to the caller instead of a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
    /// The rate limiter refused the request.
    #[error("admission denied for `{key}` until {reset_at}")]
    AdmissionDenied {
        /// Rate-limit bucket that is exhausted.
        key: String,
        /// When the bucket's window ends.
        reset_at: DateTime<Utc>,
    },
    /// Authentication failed.
    #[error("authentication failed: {source}")]
    AuthenticationFailed {
        /// Underlying authentication error.
        source: AuthError,
    },
    /// The input guard rejected the request.
    #[error("validation failed: {}", .errors.join("; "))]
    ValidationFailed {
        /// Every problem the guard found.
        errors: Vec<String>,
    },
}

impl From<Rejection> for ExecuteError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::RateLimited { key, reset_at } => Self::AdmissionDenied { key, reset_at },
            Rejection::Unauthenticated { source } => Self::AuthenticationFailed { source },
            Rejection::InvalidInput { errors } => Self::ValidationFailed { errors },
        }
    }
}

/// Failures after admission; these become degraded responses.
#[derive(Debug, Error)]
enum CoreError {
    #[error("agent `{name}` is not registered")]
    UnknownAgent { name: String },
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

/// Coordinates admission, middleware, the model loop and fallback for
/// registered agents.
pub struct ExecutionOrchestrator {
    registry: Arc<Registry>,
    resolver: Arc<ParameterResolver>,
    gate: AdmissionGate,
    middleware: MiddlewarePipeline,
    events: Arc<EventBus>,
    model: Arc<dyn ModelOrchestrator>,
    fallback: FallbackDispatcher,
    sweeper: Option<JoinHandle<()>>,
}

impl Drop for ExecutionOrchestrator {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl fmt::Debug for ExecutionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOrchestrator")
            .field("registry", &self.registry)
            .field("gate", &self.gate)
            .field("middleware", &self.middleware)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl ExecutionOrchestrator {
    /// Creates an orchestrator with an empty registry and an open gate.
    #[must_use]
    pub fn new(model: Arc<dyn ModelOrchestrator>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            resolver: Arc::new(ParameterResolver::new()),
            gate: AdmissionGate::open(),
            middleware: MiddlewarePipeline::new(),
            events: Arc::new(EventBus::new()),
            model,
            fallback: FallbackDispatcher::new(),
            sweeper: None,
        }
    }

    /// Builds an orchestrator from configuration, driving `adapter` with the
    /// configured iteration cap.
    ///
    /// When rate limiting is configured and a tokio runtime is running, the
    /// window sweep starts at the configured interval and stops when the
    /// orchestrator is dropped.
    ///
    /// # Errors
    ///
    /// Returns a policy error when the rate limit settings are unusable.
    pub fn from_config(config: &RuntimeConfig, adapter: Arc<dyn ModelAdapter>) -> PolicyResult<Self> {
        let model = AdapterOrchestrator::new(adapter)
            .with_max_iterations(config.execution.max_iterations);
        let gate = AdmissionGate::from_config(config)?;
        let mut orchestrator = Self::new(Arc::new(model)).with_gate(gate);

        if let Some(settings) = &config.rate_limit {
            if Handle::try_current().is_ok() {
                let interval = settings.sweep_interval();
                orchestrator.sweeper = orchestrator.spawn_rate_sweeper(interval);
                debug!(interval_secs = interval.as_secs(), "rate window sweeper started");
            } else {
                warn!("no tokio runtime; rate windows will not be swept");
            }
        }
        Ok(orchestrator)
    }

    /// Returns `true` while the sweep started by [`Self::from_config`] is running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .as_ref()
            .is_some_and(|sweeper| !sweeper.is_finished())
    }

    /// Shares an existing registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the parameter resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<ParameterResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the admission gate.
    #[must_use]
    pub fn with_gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = gate;
        self
    }

    /// Shares an existing event bus.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the parameter resolver, e.g. to register extra extractors.
    #[must_use]
    pub fn resolver(&self) -> &Arc<ParameterResolver> {
        &self.resolver
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Starts the periodic rate-window sweep when rate limiting is enabled.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_rate_sweeper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.gate
            .rate_limiter()
            .map(|limiter| limiter.spawn_sweeper(interval))
    }

    /// Registers an agent implemented by `instance`.
    pub fn register_agent(&self, metadata: AgentMetadata, instance: InstanceHandle) {
        let name = metadata.name().to_owned();
        let model = metadata.model().map(ToOwned::to_owned);
        self.registry.save_agent(metadata, instance);
        self.events.emit(&LifecycleEvent::AgentRegistered {
            name,
            model,
            at: Utc::now(),
        });
    }

    /// Registers a tool whose work is done by `instance`.
    pub fn register_tool<T>(&self, metadata: ToolMetadata, instance: InstanceHandle, tool: T)
    where
        T: Tool + 'static,
    {
        let record = ToolRecord::new(metadata, instance, tool);
        let name = record.name().to_owned();
        self.registry.save_tool(record);
        self.events.emit(&LifecycleEvent::ToolRegistered {
            name,
            owner: instance,
            at: Utc::now(),
        });
    }

    /// Attaches before/after hooks to the agent named `agent`.
    pub fn register_middleware(&self, agent: impl Into<String>, middleware: Arc<dyn AgentMiddleware>) {
        self.middleware.register(agent, middleware);
    }

    /// Runs a request against the agent named `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError`] when admission rejects the request. Failures
    /// after admission produce an `Ok` degraded response instead.
    pub async fn execute(
        &self,
        agent: &str,
        ctx: RequestContext,
    ) -> Result<ResponseEnvelope, ExecuteError> {
        let started = Instant::now();
        let mut lifecycle = RequestLifecycle::new(agent);

        let admission = match self.gate.admit(&ctx).await {
            Ok(admission) => admission,
            Err(rejection) => {
                if matches!(rejection, Rejection::InvalidInput { .. }) {
                    advance(&mut lifecycle, PhaseEvent::Admit);
                }
                advance(&mut lifecycle, PhaseEvent::Fail);
                warn!(agent = %agent, error = %rejection, "request rejected");
                return Err(rejection.into());
            }
        };
        advance(&mut lifecycle, PhaseEvent::Admit);
        advance(&mut lifecycle, PhaseEvent::Validate);

        let mut ctx = ctx.with_input(admission.input);
        if let Some(user) = admission.principal.user {
            ctx = ctx.with_metadata("authenticated_user", Value::from(user));
        }

        let Some(record) = self.registry.agent(agent) else {
            advance(&mut lifecycle, PhaseEvent::Fail);
            let err = CoreError::UnknownAgent {
                name: agent.to_owned(),
            };
            error!(agent = %agent, error = %err, "agent execution failed");
            return Ok(self.degraded(agent, &err));
        };

        let record = &record;
        let phases = &mut lifecycle;
        let result = self
            .middleware
            .run(ctx, record.metadata(), move |ctx| {
                self.run_core(record, ctx, phases)
            })
            .await;

        match result {
            Ok(response) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.events.emit(&LifecycleEvent::AgentExecuted {
                    name: agent.to_owned(),
                    duration_ms,
                    fallback_used: lifecycle.used_fallback(),
                    at: Utc::now(),
                });
                Ok(response)
            }
            Err(err) => {
                advance(&mut lifecycle, PhaseEvent::Fail);
                Ok(self.degraded(agent, &err))
            }
        }
    }

    async fn run_core(
        &self,
        record: &AgentRecord,
        ctx: RequestContext,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<ResponseEnvelope, CoreError> {
        let agent = record.metadata();
        let tools: Vec<ToolAdapter> = self
            .registry
            .tools_for(record.instance())
            .into_iter()
            .map(|tool| ToolAdapter::new(tool, Arc::clone(&self.resolver)))
            .collect();
        advance(lifecycle, PhaseEvent::Resolve);

        let summaries: Vec<ToolSummary> = tools.iter().map(ToolAdapter::summary).collect();
        let system_prompt = SystemPrompt::for_agent(agent).render(agent, &summaries);
        debug!(agent = %agent.name(), tools = tools.len(), "invoking model orchestration");

        let outcome = self
            .model
            .invoke(OrchestrationRequest {
                agent: agent.clone(),
                system_prompt,
                tools: tools.clone(),
                input: ctx.input().to_owned(),
                history: ctx.history().to_vec(),
            })
            .await?;
        advance(lifecycle, PhaseEvent::Invoke);

        let mut fallback_tool = None;
        let output = if outcome.is_usable() {
            outcome.output
        } else {
            advance(lifecycle, PhaseEvent::FallBack);
            info!(agent = %agent.name(), "orchestration gave no answer; running fallback");
            let fallback = self.fallback.dispatch(&tools, ctx.input()).await;
            fallback_tool = Some(fallback.tool);
            fallback.output
        };
        advance(lifecycle, PhaseEvent::Answer);

        let available: Vec<String> = self
            .registry
            .all_tools()
            .iter()
            .map(|tool| tool.name().to_owned())
            .collect();
        let exposed: Vec<&str> = tools.iter().map(ToolAdapter::name).collect();

        let mut response = ResponseEnvelope::new(output)
            .with_metadata("agent", Value::from(agent.name()))
            .with_metadata("tools_available", json!(available))
            .with_metadata("tools_exposed", json!(exposed))
            .with_metadata("fallback_used", Value::from(fallback_tool.is_some()));
        if let Some(tool) = fallback_tool {
            response.insert_metadata("fallback_tool", json!(tool));
        }
        if let Some(session) = ctx.session_id() {
            response.insert_metadata("session_id", Value::from(session));
        }
        Ok(response)
    }

    fn degraded(&self, agent: &str, err: &dyn fmt::Display) -> ResponseEnvelope {
        let error = err.to_string();
        self.events.emit(&LifecycleEvent::AgentErrored {
            name: agent.to_owned(),
            error: error.clone(),
            at: Utc::now(),
        });
        ResponseEnvelope::new(DEGRADED_APOLOGY)
            .with_metadata("error", Value::from(error))
            .with_metadata("agent", Value::from(agent))
            .with_metadata("degraded", Value::from(true))
    }
}

fn advance(lifecycle: &mut RequestLifecycle, event: PhaseEvent) {
    if let Err(err) = lifecycle.transition(event) {
        warn!(error = %err, "unexpected request phase transition");
    }
}
