use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, TimeDelta, Utc};
use serde_json::{Value, json};
use toolgate::adapters::{MessageRole, ScriptedAdapter};
use toolgate::config::RuntimeConfig;
use toolgate::kernel::{
    AgentMiddleware, CollectingObserver, DEGRADED_APOLOGY, ExecuteError, ExecutionOrchestrator,
    FALLBACK_APOLOGY, LifecycleEvent, MiddlewareError, MiddlewareResult,
};
use toolgate::policy::{AdmissionGate, AuthError, ManualClock, RateLimiter};
use toolgate::primitives::{AgentMetadata, InstanceHandle, RequestContext, ResponseEnvelope};
use toolgate::tools::{ParameterSchema, ParameterSpec, ParameterType, ToolError, ToolMetadata};

fn calculator_schema() -> ParameterSchema {
    ParameterSchema::new()
        .with(
            "operation",
            ParameterSpec::required(ParameterType::String, "add, subtract, multiply or divide")
                .with_allowed_values(["add", "subtract", "multiply", "divide"]),
        )
        .with("a", ParameterSpec::required(ParameterType::Number, "First operand"))
        .with("b", ParameterSpec::required(ParameterType::Number, "Second operand"))
}

async fn calculate(args: Value) -> Result<Value, ToolError> {
    let a = args["a"].as_f64().ok_or_else(|| ToolError::execution("`a` must be a number"))?;
    let b = args["b"].as_f64().ok_or_else(|| ToolError::execution("`b` must be a number"))?;
    let result = match args["operation"].as_str() {
        Some("add") => a + b,
        Some("subtract") => a - b,
        Some("multiply") => a * b,
        Some("divide") if b == 0.0 => return Err(ToolError::execution("division by zero")),
        Some("divide") => a / b,
        other => return Err(ToolError::execution(format!("unsupported operation {other:?}"))),
    };
    Ok(json!(result))
}

/// Registers a calculator agent and a weather agent, each with one tool.
fn register_agents(orchestrator: &ExecutionOrchestrator) {
    let calculator = InstanceHandle::random();
    orchestrator.register_agent(
        AgentMetadata::builder()
            .name("calculator-agent")
            .unwrap()
            .description("Does arithmetic")
            .model("scripted")
            .build()
            .unwrap(),
        calculator,
    );
    orchestrator.register_tool(
        ToolMetadata::new("calculator")
            .unwrap()
            .with_description("Performs basic arithmetic")
            .with_parameters(calculator_schema()),
        calculator,
        calculate,
    );

    let weather = InstanceHandle::random();
    orchestrator.register_agent(
        AgentMetadata::builder()
            .name("weather-agent")
            .unwrap()
            .description("Reports the weather")
            .build()
            .unwrap(),
        weather,
    );
    orchestrator.register_tool(
        ToolMetadata::new("weather")
            .unwrap()
            .with_description("Current conditions for a location")
            .with_parameters(ParameterSchema::new().with(
                "location",
                ParameterSpec::required(ParameterType::String, "City name"),
            )),
        weather,
        |args: Value| async move {
            let location = args["location"].as_str().unwrap_or("unknown").to_owned();
            Ok(json!(format!("22°C and sunny in {location}")))
        },
    );
}

fn orchestrator(adapter: Arc<ScriptedAdapter>, config: &RuntimeConfig) -> ExecutionOrchestrator {
    let orchestrator = ExecutionOrchestrator::from_config(config, adapter).unwrap();
    register_agents(&orchestrator);
    orchestrator
}

#[tokio::test]
async fn tool_loop_answers_through_calculator() {
    let adapter = Arc::new(ScriptedAdapter::new([
        r#"Action: calculator
Action Input: {"operation": "multiply", "a": 6, "b": 7}"#,
        "Final Answer: 6 times 7 is 42.",
    ]));
    let orchestrator = orchestrator(adapter.clone(), &RuntimeConfig::default());

    let response = orchestrator
        .execute("calculator-agent", RequestContext::new("what is 6 times 7?"))
        .await
        .unwrap();

    assert_eq!(response.output(), "6 times 7 is 42.");
    assert_eq!(response.metadata_value("fallback_used"), Some(&json!(false)));
    assert_eq!(response.metadata_value("tools_exposed"), Some(&json!(["calculator"])));
    assert_eq!(
        response.metadata_value("tools_available"),
        Some(&json!(["calculator", "weather"]))
    );

    let observation = adapter.requests()[1].messages().last().unwrap().clone();
    assert_eq!(observation.role(), MessageRole::Tool);
    assert_eq!(observation.content(), "Observation: 42.0");
}

#[tokio::test]
async fn symbolic_operator_is_not_resolved() {
    let adapter = Arc::new(ScriptedAdapter::new([
        "Action: calculator\nAction Input: what's 2 + 2?",
        "Final Answer: I could not compute that.",
    ]));
    let orchestrator = orchestrator(adapter.clone(), &RuntimeConfig::default());

    orchestrator
        .execute("calculator-agent", RequestContext::new("what's 2 + 2?"))
        .await
        .unwrap();

    let observation = adapter.requests()[1].messages().last().unwrap().clone();
    assert!(
        observation
            .content()
            .starts_with("Observation: Error: required parameter `operation` not found"),
        "{}",
        observation.content()
    );
}

#[tokio::test]
async fn exhausted_loop_falls_back_to_named_tool() {
    let adapter = Arc::new(ScriptedAdapter::repeating(
        "Action: forecast\nAction Input: Paris",
    ));
    let orchestrator = orchestrator(adapter.clone(), &RuntimeConfig::default());
    let observer = CollectingObserver::new();
    orchestrator.events().subscribe(observer.clone());

    let response = orchestrator
        .execute("weather-agent", RequestContext::new("What's the weather in Paris?"))
        .await
        .unwrap();

    assert_eq!(
        response.output(),
        "Based on the weather information: 22°C and sunny in Paris"
    );
    assert_eq!(response.metadata_value("fallback_used"), Some(&json!(true)));
    assert_eq!(adapter.requests().len(), 3);
    assert!(matches!(
        observer.drain().as_slice(),
        [LifecycleEvent::AgentExecuted { fallback_used: true, .. }]
    ));
}

#[tokio::test]
async fn exhausted_loop_without_relevant_tool_apologises() {
    let adapter = Arc::new(ScriptedAdapter::repeating(" "));
    let orchestrator = orchestrator(adapter, &RuntimeConfig::default());

    let response = orchestrator
        .execute("weather-agent", RequestContext::new("sing me a song"))
        .await
        .unwrap();
    assert_eq!(response.output(), FALLBACK_APOLOGY);
}

#[tokio::test]
async fn model_failure_degrades() {
    let adapter = Arc::new(ScriptedAdapter::new(Vec::<String>::new()));
    let orchestrator = orchestrator(adapter, &RuntimeConfig::default());

    let response = orchestrator
        .execute("weather-agent", RequestContext::new("weather in Rome"))
        .await
        .unwrap();

    assert_eq!(response.output(), DEGRADED_APOLOGY);
    assert_eq!(response.metadata_value("degraded"), Some(&json!(true)));
    assert_eq!(response.metadata_value("agent"), Some(&json!("weather-agent")));
    assert!(response.metadata_value("error").is_some());
}

#[tokio::test]
async fn unknown_agent_degrades() {
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: hi"));
    let orchestrator = orchestrator(adapter, &RuntimeConfig::default());

    let response = orchestrator
        .execute("nobody", RequestContext::new("hello"))
        .await
        .unwrap();
    assert_eq!(response.output(), DEGRADED_APOLOGY);
}

#[tokio::test]
async fn second_request_in_window_is_denied() {
    let config = RuntimeConfig::from_value(json!({
        "rate_limit": { "max_requests": 1, "window_seconds": 60 }
    }))
    .unwrap();
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: ok"));
    let orchestrator = orchestrator(adapter, &config);
    let ctx = RequestContext::new("weather in Rome").with_session_id("session-7");

    assert!(orchestrator.execute("weather-agent", ctx.clone()).await.is_ok());
    let err = orchestrator.execute("weather-agent", ctx).await.unwrap_err();
    assert!(matches!(err, ExecuteError::AdmissionDenied { ref key, .. } if key == "session-7"));

    // Other keys have their own window.
    let other = RequestContext::new("weather in Rome").with_session_id("session-8");
    assert!(orchestrator.execute("weather-agent", other).await.is_ok());
}

#[tokio::test]
async fn window_reopens_after_it_elapses() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let limiter = RateLimiter::new(1, Duration::from_secs(60))
        .unwrap()
        .with_clock(clock.clone());
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: ok"));
    let orchestrator = ExecutionOrchestrator::from_config(&RuntimeConfig::default(), adapter)
        .unwrap()
        .with_gate(AdmissionGate::open().with_rate_limiter(Arc::new(limiter)));
    register_agents(&orchestrator);

    let ctx = RequestContext::new("weather in Rome");
    assert!(orchestrator.execute("weather-agent", ctx.clone()).await.is_ok());
    assert!(orchestrator.execute("weather-agent", ctx.clone()).await.is_err());

    clock.advance(TimeDelta::seconds(60));
    assert!(orchestrator.execute("weather-agent", ctx).await.is_ok());
}

#[tokio::test]
async fn malicious_input_is_rejected_with_every_error() {
    let config = RuntimeConfig::from_value(json!({
        "guard": {
            "max_input_length": 40,
            "sanitize_input": true,
            "allowed_domains": ["example.com"]
        }
    }))
    .unwrap();
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: ok"));
    let orchestrator = orchestrator(adapter.clone(), &config);

    let err = orchestrator
        .execute(
            "weather-agent",
            RequestContext::new("<script>alert(1)</script> see https://evil.test/x please"),
        )
        .await
        .unwrap_err();
    let ExecuteError::ValidationFailed { errors } = err else {
        panic!("expected validation failure, got {err:?}");
    };
    assert_eq!(errors.len(), 3, "{errors:?}");
    assert!(adapter.requests().is_empty());
}

#[tokio::test]
async fn sanitized_input_reaches_the_model() {
    let config = RuntimeConfig::from_value(json!({ "guard": { "sanitize_input": true } })).unwrap();
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: ok"));
    let orchestrator = orchestrator(adapter.clone(), &config);

    orchestrator
        .execute("weather-agent", RequestContext::new("  weather \u{0}in\t\tRome  "))
        .await
        .unwrap();

    let request = &adapter.requests()[0];
    assert_eq!(request.messages().last().unwrap().content(), "weather in Rome");
}

#[tokio::test]
async fn api_key_authentication() {
    let config = RuntimeConfig::from_value(json!({
        "guard": {
            "authentication": {
                "scheme": "api_key",
                "credentials": [{ "secret": "k-123", "user": "ops" }]
            }
        }
    }))
    .unwrap();
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: ok"));
    let orchestrator = orchestrator(adapter, &config);

    let err = orchestrator
        .execute("weather-agent", RequestContext::new("weather in Rome"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::AuthenticationFailed {
            source: AuthError::MissingCredential { .. }
        }
    ));

    let ctx = RequestContext::new("weather in Rome")
        .with_metadata("headers", json!({ "X-Api-Key": "k-123" }));
    let response = orchestrator.execute("weather-agent", ctx).await.unwrap();
    assert_eq!(response.output(), "ok");
}

/// Records what the hooks saw and fails in `before`.
#[derive(Default)]
struct AuditMiddleware {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl AgentMiddleware for AuditMiddleware {
    async fn before(
        &self,
        ctx: RequestContext,
        _agent: &AgentMetadata,
    ) -> MiddlewareResult<RequestContext> {
        self.seen.lock().unwrap().push(format!("before:{}", ctx.input()));
        Err(MiddlewareError::hook("audit store offline"))
    }

    async fn after(
        &self,
        ctx: &RequestContext,
        response: ResponseEnvelope,
        _agent: &AgentMetadata,
    ) -> MiddlewareResult<ResponseEnvelope> {
        self.seen.lock().unwrap().push(format!("after:{}", ctx.input()));
        Ok(response.with_metadata("audited", json!(true)))
    }
}

#[tokio::test]
async fn failing_before_hook_does_not_block_execution() {
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: sunny"));
    let orchestrator = orchestrator(adapter.clone(), &RuntimeConfig::default());
    let middleware = Arc::new(AuditMiddleware::default());
    orchestrator.register_middleware("weather-agent", middleware.clone());

    let response = orchestrator
        .execute("weather-agent", RequestContext::new("weather in Rome"))
        .await
        .unwrap();

    assert_eq!(response.output(), "sunny");
    assert_eq!(response.metadata_value("audited"), Some(&json!(true)));
    assert_eq!(
        *middleware.seen.lock().unwrap(),
        ["before:weather in Rome", "after:weather in Rome"]
    );
    assert_eq!(
        adapter.requests()[0].messages().last().unwrap().content(),
        "weather in Rome"
    );
}

#[tokio::test]
async fn sweeper_runs_only_with_rate_limiting() {
    let adapter = Arc::new(ScriptedAdapter::repeating("Final Answer: ok"));
    let open = orchestrator(adapter.clone(), &RuntimeConfig::default());
    assert!(open.spawn_rate_sweeper(Duration::from_secs(1)).is_none());

    let config = RuntimeConfig::from_value(json!({
        "rate_limit": { "max_requests": 5, "window_seconds": 1 }
    }))
    .unwrap();
    let limited = orchestrator(adapter, &config);
    assert!(limited.is_sweeping());
    let sweeper = limited
        .spawn_rate_sweeper(config.rate_limit.as_ref().unwrap().sweep_interval())
        .expect("rate limiting is configured");
    assert!(!sweeper.is_finished());
    sweeper.abort();
}
