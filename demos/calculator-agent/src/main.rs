//! Calculator agent walking through the execution pipeline with a scripted model.
//!
//! The first request is answered through the tool loop. The second uses a model
//! that never finishes, so the fallback dispatcher calls the calculator directly.

use std::path::PathBuf;
use std::sync::Arc;

use agent_adapters::ScriptedAdapter;
use agent_config::{GuardSettings, RateLimitSettings, RuntimeConfig};
use agent_kernel::{AgentMiddleware, ExecutionOrchestrator, MiddlewareResult, TracingEventObserver};
use agent_primitives::{AgentMetadata, InstanceHandle, RequestContext, ResponseEnvelope};
use agent_telemetry::{LogFormat, TelemetryConfig, init_tracing};
use agent_tools::{ParameterSchema, ParameterSpec, ParameterType, ToolError, ToolMetadata};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};

const AGENT: &str = "calculator-agent";

#[derive(Debug, Parser)]
#[command(about = "Runs a calculator agent through the tool execution pipeline")]
struct Args {
    /// Request handed to the agent.
    #[arg(default_value = "multiply 6 and 7")]
    input: String,

    /// JSON runtime configuration; a rate-limited, guarded default is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the compact log layout.
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&TelemetryConfig {
        format: if args.compact {
            LogFormat::Compact
        } else {
            LogFormat::Full
        },
        ..TelemetryConfig::default()
    })?;

    let config = load_config(args.config.as_deref())?;

    info!("--- tool loop ---");
    let adapter = Arc::new(ScriptedAdapter::new([
        r#"Action: calculator
Action Input: {"operation": "multiply", "a": 6, "b": 7}"#,
        "Final Answer: 6 multiplied by 7 is 42.",
    ]));
    let orchestrator = build(&config, adapter)?;
    report(&orchestrator, RequestContext::new("what is 6 times 7?").with_session_id("demo-1")).await;

    info!("--- fallback ---");
    let adapter = Arc::new(ScriptedAdapter::repeating(
        "Action: search\nAction Input: arithmetic tables",
    ));
    let orchestrator = build(&config, adapter)?;
    report(&orchestrator, RequestContext::new(args.input.as_str()).with_session_id("demo-2")).await;

    info!("--- guard ---");
    report(
        &orchestrator,
        RequestContext::new("<script>alert(1)</script> add 1 and 2").with_session_id("demo-3"),
    )
    .await;

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig {
            rate_limit: Some(RateLimitSettings::new(5, 60)),
            guard: Some(GuardSettings {
                max_input_length: Some(500),
                sanitize_input: true,
                ..GuardSettings::default()
            }),
            ..RuntimeConfig::default()
        });
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    RuntimeConfig::from_json_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn build(config: &RuntimeConfig, adapter: Arc<ScriptedAdapter>) -> Result<ExecutionOrchestrator> {
    let orchestrator = ExecutionOrchestrator::from_config(config, adapter)?;
    orchestrator.events().subscribe(Arc::new(TracingEventObserver));

    let instance = InstanceHandle::random();
    orchestrator.register_agent(
        AgentMetadata::builder()
            .name(AGENT)?
            .description("Answers arithmetic questions")
            .model("scripted")
            .build()?,
        instance,
    );
    orchestrator.register_tool(
        ToolMetadata::new("calculator")?
            .with_description("Performs arithmetic: add, subtract, multiply or divide")
            .with_parameters(
                ParameterSchema::new()
                    .with(
                        "operation",
                        ParameterSpec::required(ParameterType::String, "Arithmetic operation")
                            .with_allowed_values(["add", "subtract", "multiply", "divide"]),
                    )
                    .with("a", ParameterSpec::required(ParameterType::Number, "First operand"))
                    .with("b", ParameterSpec::required(ParameterType::Number, "Second operand")),
            ),
        instance,
        calculate,
    );
    orchestrator.register_middleware(AGENT, Arc::new(Stamp));
    if !orchestrator.is_sweeping() {
        warn!("rate limiting disabled; no window sweep running");
    }

    Ok(orchestrator)
}

async fn report(orchestrator: &ExecutionOrchestrator, ctx: RequestContext) {
    match orchestrator.execute(AGENT, ctx).await {
        Ok(response) => {
            let metadata = Value::Object(response.metadata().clone());
            info!(output = response.output(), %metadata, "agent responded");
        }
        Err(err) => warn!(%err, "request rejected"),
    }
}

async fn calculate(args: Value) -> Result<Value, ToolError> {
    let operand = |key: &str| {
        args[key]
            .as_f64()
            .ok_or_else(|| ToolError::execution(format!("`{key}` must be a number")))
    };
    let (a, b) = (operand("a")?, operand("b")?);

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

/// Tags every response with the demo name.
struct Stamp;

#[async_trait]
impl AgentMiddleware for Stamp {
    async fn after(
        &self,
        _ctx: &RequestContext,
        response: ResponseEnvelope,
        _agent: &AgentMetadata,
    ) -> MiddlewareResult<ResponseEnvelope> {
        Ok(response.with_metadata("handled_by", json!("calculator-demo")))
    }
}
