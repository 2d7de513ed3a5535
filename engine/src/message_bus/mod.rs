//! Message Bus for inter-component communication
//!
//! The MessageBus carries world events (ticks, health changes) from the game
//! adapter to the scheduler, and engine events (task lifecycle, reflexes)
//! from the scheduler to anyone listening, such as the event recorder. It
//! uses bounded channels and supports both specific event subscriptions and
//! global "All" subscriptions.
//!
//! Publishing never waits on a slow subscriber: when a subscriber's buffer
//! is full the event is dropped for that subscriber only. A stalled logger
//! must not delay the tick loop.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A world update cycle elapsed
    Tick,
    /// Health or food changed
    Health,
    /// Task has started execution
    TaskStarted,
    /// Task reached its goal
    TaskCompleted,
    /// Task was abandoned or failed
    TaskFailed,
    /// Task was stopped from outside
    TaskStopped,
    /// A reflex took control
    ReflexFired,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Tick,
    Health,
    TaskStarted {
        task_id: Uuid,
        kind: String,
    },
    TaskCompleted {
        task_id: Uuid,
        kind: String,
        detail: String,
    },
    TaskFailed {
        task_id: Uuid,
        kind: String,
        error: String,
    },
    TaskStopped {
        task_id: Uuid,
        kind: String,
    },
    /// `reflex` is `"auto_eat"` or `"threat"`
    ReflexFired {
        reflex: String,
        detail: String,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Tick => EventType::Tick,
            Event::Health => EventType::Health,
            Event::TaskStarted { .. } => EventType::TaskStarted,
            Event::TaskCompleted { .. } => EventType::TaskCompleted,
            Event::TaskFailed { .. } => EventType::TaskFailed,
            Event::TaskStopped { .. } => EventType::TaskStopped,
            Event::ReflexFired { .. } => EventType::ReflexFired,
        }
    }

    /// Stable snake_case name used when events are persisted
    pub fn name(&self) -> &'static str {
        match self {
            Event::Tick => "tick",
            Event::Health => "health",
            Event::TaskStarted { .. } => "task_started",
            Event::TaskCompleted { .. } => "task_completed",
            Event::TaskFailed { .. } => "task_failed",
            Event::TaskStopped { .. } => "task_stopped",
            Event::ReflexFired { .. } => "reflex_fired",
        }
    }

    /// Whether the event is part of the world feed rather than engine output
    pub fn is_world_event(&self) -> bool {
        matches!(self, Event::Tick | Event::Health)
    }

    /// The event's fields as a JSON object; `None` for world feed events
    pub fn detail(&self) -> Option<serde_json::Value> {
        let detail = match self {
            Event::Tick | Event::Health => return None,
            Event::TaskStarted { task_id, kind } | Event::TaskStopped { task_id, kind } => {
                json!({ "task_id": task_id.to_string(), "kind": kind })
            }
            Event::TaskCompleted {
                task_id,
                kind,
                detail,
            } => json!({ "task_id": task_id.to_string(), "kind": kind, "detail": detail }),
            Event::TaskFailed {
                task_id,
                kind,
                error,
            } => json!({ "task_id": task_id.to_string(), "kind": kind, "error": error }),
            Event::ReflexFired { reflex, detail } => {
                json!({ "reflex": reflex, "detail": detail })
            }
        };
        Some(detail)
    }
}

/// Message bus for pub/sub communication between components
///
/// Cloning a bus yields another handle to the same subscriber table.
#[derive(Clone)]
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type
    ///
    /// Returns a receiver that will receive events of the specified type.
    /// Pass `EventType::All` to receive everything.
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers
    ///
    /// The event is sent to all subscribers of the specific event type,
    /// as well as all subscribers of EventType::All. Closed subscribers are
    /// pruned; full subscribers miss this event.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        debug!("Subscriber buffer full, dropping {}", event.name());
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
