//! Lifecycle event fan-out.
//!
//! The [`EventBus`] is an explicit object owned by the orchestrator. Observers
//! are synchronous and expected not to fail; a panicking observer is not caught.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use agent_primitives::InstanceHandle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Notification emitted at registration and execution boundaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// An agent was pushed into the registry.
    AgentRegistered {
        /// Agent name.
        name: String,
        /// Model identifier the agent asked for.
        model: Option<String>,
        /// Emission time.
        at: DateTime<Utc>,
    },
    /// A tool was pushed into the registry.
    ToolRegistered {
        /// Tool name.
        name: String,
        /// Instance that performs the tool's work.
        owner: InstanceHandle,
        /// Emission time.
        at: DateTime<Utc>,
    },
    /// An execution finished with a usable response.
    AgentExecuted {
        /// Agent name.
        name: String,
        /// Wall time spent in the orchestrator.
        duration_ms: u64,
        /// Whether the fallback dispatcher produced the output.
        fallback_used: bool,
        /// Emission time.
        at: DateTime<Utc>,
    },
    /// An execution ended in a degraded response.
    AgentErrored {
        /// Agent name.
        name: String,
        /// Rendered error.
        error: String,
        /// Emission time.
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Name of the agent or tool the event is about.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::AgentRegistered { name, .. }
            | Self::ToolRegistered { name, .. }
            | Self::AgentExecuted { name, .. }
            | Self::AgentErrored { name, .. } => name,
        }
    }

    /// Time the event was created.
    #[must_use]
    pub const fn at(&self) -> DateTime<Utc> {
        match self {
            Self::AgentRegistered { at, .. }
            | Self::ToolRegistered { at, .. }
            | Self::AgentExecuted { at, .. }
            | Self::AgentErrored { at, .. } => *at,
        }
    }

    /// Stable label for the event variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AgentRegistered { .. } => "agent_registered",
            Self::ToolRegistered { .. } => "tool_registered",
            Self::AgentExecuted { .. } => "agent_executed",
            Self::AgentErrored { .. } => "agent_errored",
        }
    }
}

/// Receives lifecycle events.
pub trait EventObserver: Send + Sync {
    /// Handles a single event.
    fn on_event(&self, event: &LifecycleEvent);
}

/// Fan-out channel for [`LifecycleEvent`]s.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn EventObserver>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer; it receives every event emitted afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the observer list lock is poisoned.
    pub fn subscribe(&self, observer: Arc<dyn EventObserver>) {
        self.observers
            .write()
            .expect("event bus poisoned")
            .push(observer);
    }

    /// Number of subscribed observers.
    ///
    /// # Panics
    ///
    /// Panics if the observer list lock is poisoned.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().expect("event bus poisoned").len()
    }

    /// Delivers `event` to every observer in subscription order.
    ///
    /// # Panics
    ///
    /// Panics if the observer list lock is poisoned.
    pub fn emit(&self, event: &LifecycleEvent) {
        let observers = self.observers.read().expect("event bus poisoned").clone();
        for observer in observers {
            observer.on_event(event);
        }
    }
}

/// Observer that writes events to the tracing system.
#[derive(Debug, Default)]
pub struct TracingEventObserver;

impl EventObserver for TracingEventObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::AgentRegistered { name, model, .. } => {
                info!(agent = %name, model = ?model, "agent registered");
            }
            LifecycleEvent::ToolRegistered { name, owner, .. } => {
                info!(tool = %name, %owner, "tool registered");
            }
            LifecycleEvent::AgentExecuted {
                name,
                duration_ms,
                fallback_used,
                ..
            } => {
                info!(agent = %name, duration_ms, fallback_used, "agent executed");
            }
            LifecycleEvent::AgentErrored { name, error, .. } => {
                warn!(agent = %name, error = %error, "agent errored");
            }
        }
    }
}

/// Observer that keeps every event, mostly for tests.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl CollectingObserver {
    /// Creates a shared collecting observer.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a copy of the collected events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().expect("collecting observer poisoned").clone()
    }

    /// Removes and returns the collected events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn drain(&self) -> Vec<LifecycleEvent> {
        let mut lock = self.events.lock().expect("collecting observer poisoned");
        lock.drain(..).collect()
    }
}

impl EventObserver for CollectingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        self.events
            .lock()
            .expect("collecting observer poisoned")
            .push(event.clone());
    }
}
