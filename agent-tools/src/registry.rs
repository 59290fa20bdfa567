//! Process-lifetime storage for agent and tool records.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

use agent_primitives::{AgentMetadata, AgentRecord, InstanceHandle};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::metadata::ToolMetadata;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Trait implemented by the method that performs a tool's work.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with resolved arguments.
    async fn invoke(&self, args: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, args: Value) -> ToolResult<Value> {
        (self)(args).await
    }
}

/// Registry entry for a tool.
///
/// `owner` is a lookup-only back-reference to the agent instance that provides
/// the tool; the registry never owns agent instances.
#[derive(Clone)]
pub struct ToolRecord {
    metadata: Arc<ToolMetadata>,
    owner: InstanceHandle,
    executor: Arc<dyn Tool>,
}

impl fmt::Debug for ToolRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRecord")
            .field("name", &self.metadata.name())
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl ToolRecord {
    /// Creates a record binding metadata, owner, and implementation.
    #[must_use]
    pub fn new<T>(metadata: ToolMetadata, owner: InstanceHandle, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        Self {
            metadata: Arc::new(metadata),
            owner,
            executor: Arc::new(tool),
        }
    }

    /// Returns the tool metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the handle of the owning agent instance.
    #[must_use]
    pub const fn owner(&self) -> InstanceHandle {
        self.owner
    }

    /// Executes the underlying tool implementation.
    ///
    /// # Errors
    ///
    /// Propagates any [`ToolError`] returned by the implementation.
    pub async fn invoke(&self, args: Value) -> ToolResult<Value> {
        self.executor.invoke(args).await
    }
}

/// Name-keyed map that remembers first-insertion order.
struct Ordered<T> {
    next_seq: u64,
    entries: HashMap<String, (u64, T)>,
}

impl<T: Clone> Ordered<T> {
    fn new() -> Self {
        Self {
            next_seq: 0,
            entries: HashMap::new(),
        }
    }

    /// Inserts or replaces; a replaced entry keeps its original position.
    fn upsert(&mut self, name: String, value: T) -> Option<T> {
        if let Some(slot) = self.entries.get_mut(&name) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(name, (seq, value));
        None
    }

    fn get(&self, name: &str) -> Option<T> {
        self.entries.get(name).map(|(_, value)| value.clone())
    }

    fn remove(&mut self, name: &str) -> Option<T> {
        self.entries.remove(name).map(|(_, value)| value)
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn snapshot(&self) -> Vec<T> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, value)| value.clone()).collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// In-memory store of agents and tools.
///
/// Pure storage: no validation beyond what the record types enforce.
/// Re-registering a name replaces the previous record (last write wins) and
/// keeps its position in registration order. Snapshot methods return copies.
pub struct Registry {
    agents: RwLock<Ordered<AgentRecord>>,
    tools: RwLock<Ordered<ToolRecord>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            agents: RwLock::new(Ordered::new()),
            tools: RwLock::new(Ordered::new()),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let agents: Vec<_> = self
            .all_agents()
            .iter()
            .map(|agent| agent.name().to_owned())
            .collect();
        let tools: Vec<_> = self
            .all_tools()
            .iter()
            .map(|tool| tool.name().to_owned())
            .collect();
        f.debug_struct("Registry")
            .field("agents", &agents)
            .field("tools", &tools)
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an agent under its metadata name, returning any replaced record.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn save_agent(
        &self,
        metadata: AgentMetadata,
        instance: InstanceHandle,
    ) -> Option<AgentRecord> {
        let name = metadata.name().to_owned();
        let record = AgentRecord::new(metadata, instance);
        let replaced = self
            .agents
            .write()
            .expect("agent registry poisoned")
            .upsert(name.clone(), record);
        debug!(agent = %name, %instance, replaced = replaced.is_some(), "agent saved");
        replaced
    }

    /// Returns the agent registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<AgentRecord> {
        self.agents.read().expect("agent registry poisoned").get(name)
    }

    /// Returns a copy of every agent record in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn all_agents(&self) -> Vec<AgentRecord> {
        self.agents.read().expect("agent registry poisoned").snapshot()
    }

    /// Removes an agent, returning the removed record.
    ///
    /// Tools owned by the agent's instance are left in place.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn remove_agent(&self, name: &str) -> Option<AgentRecord> {
        self.agents
            .write()
            .expect("agent registry poisoned")
            .remove(name)
    }

    /// Returns `true` when an agent is registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn has_agent(&self, name: &str) -> bool {
        self.agents
            .read()
            .expect("agent registry poisoned")
            .contains(name)
    }

    /// Stores a tool under its metadata name, returning any replaced record.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn save_tool(&self, record: ToolRecord) -> Option<ToolRecord> {
        let name = record.name().to_owned();
        let owner = record.owner();
        let replaced = self
            .tools
            .write()
            .expect("tool registry poisoned")
            .upsert(name.clone(), record);
        debug!(tool = %name, %owner, replaced = replaced.is_some(), "tool saved");
        replaced
    }

    /// Returns the tool registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<ToolRecord> {
        self.tools.read().expect("tool registry poisoned").get(name)
    }

    /// Returns a copy of every tool record in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn all_tools(&self) -> Vec<ToolRecord> {
        self.tools.read().expect("tool registry poisoned").snapshot()
    }

    /// Returns the tools owned by `instance`, in registration order.
    #[must_use]
    pub fn tools_for(&self, instance: InstanceHandle) -> Vec<ToolRecord> {
        self.all_tools()
            .into_iter()
            .filter(|tool| tool.owner() == instance)
            .collect()
    }

    /// Removes a tool, returning the removed record.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn remove_tool(&self, name: &str) -> Option<ToolRecord> {
        self.tools.write().expect("tool registry poisoned").remove(name)
    }

    /// Returns `true` when a tool is registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools
            .read()
            .expect("tool registry poisoned")
            .contains(name)
    }

    /// Drops every agent and tool.
    ///
    /// # Panics
    ///
    /// Panics if an internal registry lock is poisoned.
    pub fn clear(&self) {
        self.agents.write().expect("agent registry poisoned").clear();
        self.tools.write().expect("tool registry poisoned").clear();
    }
}

/// Errors produced by tool metadata construction and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> AgentMetadata {
        AgentMetadata::builder().name(name).unwrap().build().unwrap()
    }

    fn echo(name: &str, owner: InstanceHandle) -> ToolRecord {
        ToolRecord::new(
            ToolMetadata::new(name).unwrap().with_description("Echo input"),
            owner,
            |args: Value| async move { Ok(args) },
        )
    }

    #[test]
    fn re_registration_overwrites_agent() {
        let registry = Registry::new();
        let first = InstanceHandle::random();
        let second = InstanceHandle::random();

        assert!(registry.save_agent(agent("weather"), first).is_none());
        let replaced = registry.save_agent(agent("weather"), second).unwrap();

        assert_eq!(replaced.instance(), first);
        assert_eq!(registry.all_agents().len(), 1);
        assert_eq!(registry.agent("weather").unwrap().instance(), second);
    }

    #[test]
    fn snapshots_follow_registration_order() {
        let registry = Registry::new();
        let owner = InstanceHandle::random();
        for name in ["zeta", "alpha", "mid"] {
            registry.save_tool(echo(name, owner));
        }
        registry.save_tool(echo("alpha", owner));

        let names: Vec<_> = registry
            .all_tools()
            .iter()
            .map(|tool| tool.name().to_owned())
            .collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let registry = Registry::new();
        let owner = InstanceHandle::random();
        registry.save_tool(echo("echo", owner));

        let mut snapshot = registry.all_tools();
        snapshot.clear();

        assert!(registry.has_tool("echo"));
    }

    #[test]
    fn tools_for_filters_by_owner() {
        let registry = Registry::new();
        let mine = InstanceHandle::random();
        let theirs = InstanceHandle::random();
        registry.save_tool(echo("a", mine));
        registry.save_tool(echo("b", theirs));
        registry.save_tool(echo("c", mine));

        let names: Vec<_> = registry
            .tools_for(mine)
            .iter()
            .map(|tool| tool.name().to_owned())
            .collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn removal_and_existence() {
        let registry = Registry::new();
        let owner = InstanceHandle::random();
        registry.save_agent(agent("weather"), owner);
        registry.save_tool(echo("echo", owner));

        assert!(registry.has_agent("weather"));
        assert!(registry.remove_agent("weather").is_some());
        assert!(!registry.has_agent("weather"));
        assert!(registry.remove_agent("weather").is_none());

        registry.clear();
        assert!(!registry.has_tool("echo"));
    }

    #[tokio::test]
    async fn record_invokes_executor() {
        let record = echo("echo", InstanceHandle::random());
        let payload = serde_json::json!({ "message": "hello" });

        let output = record.invoke(payload.clone()).await.unwrap();
        assert_eq!(output, payload);
    }
}
