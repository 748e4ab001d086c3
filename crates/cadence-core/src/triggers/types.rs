//! Trigger data model
//!
//! Schedules, their triggers, the events those triggers observe and the
//! progress/result records produced while processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::predicate::PayloadMatcher;

/// Event kinds a trigger can count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// App moved to the foreground
    Foreground,
    /// App moved to the background
    Background,
    /// App initialized
    AppInit,
    /// Screen viewed
    Screen,
    /// Region entered
    RegionEnter,
    /// Region exited
    RegionExit,
    /// Custom event, counted once per occurrence
    #[serde(alias = "custom_event_count")]
    CustomEvent,
    /// Custom event, counted by the event's value
    CustomEventValue,
    /// Feature flag interaction
    FeatureFlagInteraction,
    /// New app session observed (state trigger)
    ActiveSession,
    /// App version changed (state trigger)
    Version,
}

impl EventType {
    /// State triggers are driven by [`AutomationEvent::StateChanged`]
    #[must_use]
    pub fn is_state_type(&self) -> bool {
        matches!(self, EventType::ActiveSession | EventType::Version)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Foreground => "foreground",
            EventType::Background => "background",
            EventType::AppInit => "app_init",
            EventType::Screen => "screen",
            EventType::RegionEnter => "region_enter",
            EventType::RegionExit => "region_exit",
            EventType::CustomEvent => "custom_event",
            EventType::CustomEventValue => "custom_event_value",
            EventType::FeatureFlagInteraction => "feature_flag_interaction",
            EventType::ActiveSession => "active_session",
            EventType::Version => "version",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application state observed by state triggers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerableState {
    /// Current app session identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_session_id: Option<String>,
    /// Version the app was updated to, if an update was detected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_updated: Option<String>,
}

/// Inbound event fed to the trigger processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutomationEvent {
    /// A discrete application event
    Event {
        /// Event type
        event_type: EventType,
        /// Optional JSON payload evaluated by payload matchers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Progress contributed by this event (only `custom_event_value` uses
        /// anything other than 1)
        #[serde(default = "default_event_value")]
        value: f64,
    },
    /// Application state changed
    StateChanged(TriggerableState),
}

fn default_event_value() -> f64 {
    1.0
}

impl AutomationEvent {
    /// Create an event without payload
    #[must_use]
    pub fn event(event_type: EventType) -> Self {
        Self::Event {
            event_type,
            data: None,
            value: 1.0,
        }
    }

    /// Create an event with a JSON payload
    #[must_use]
    pub fn with_data(event_type: EventType, data: Value) -> Self {
        Self::Event {
            event_type,
            data: Some(data),
            value: 1.0,
        }
    }

    /// Create a `custom_event_value` event
    #[must_use]
    pub fn custom_value(value: f64, data: Option<Value>) -> Self {
        Self::Event {
            event_type: EventType::CustomEventValue,
            data,
            value,
        }
    }

    /// Create a state change event
    #[must_use]
    pub fn state(state: TriggerableState) -> Self {
        Self::StateChanged(state)
    }
}

/// A rule that accumulates progress from matching events toward a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger ID, unique within its schedule
    pub id: String,
    /// Event type this trigger counts
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Progress required to fire
    pub goal: f64,
    /// Optional payload matcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<PayloadMatcher>,
}

impl Trigger {
    /// Create a trigger without predicate
    pub fn new(id: impl Into<String>, event_type: EventType, goal: f64) -> Self {
        Self {
            id: id.into(),
            event_type,
            goal,
            predicate: None,
        }
    }

    /// Attach a payload matcher
    #[must_use]
    pub fn with_predicate(mut self, predicate: PayloadMatcher) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Evaluate an event against this trigger, updating `data` on a match.
    ///
    /// Returns `None` when the event does not match, otherwise whether the
    /// goal has been reached.
    pub(crate) fn match_event(&self, event: &AutomationEvent, data: &mut TriggerData) -> Option<bool> {
        match event {
            AutomationEvent::StateChanged(state) => self.match_state(state, data),
            AutomationEvent::Event {
                event_type,
                data: payload,
                value,
            } => {
                if *event_type != self.event_type || self.event_type.is_state_type() {
                    return None;
                }
                if !self.predicate_matches(payload.as_ref().unwrap_or(&Value::Null)) {
                    return None;
                }
                let increment = match self.event_type {
                    EventType::CustomEventValue => *value,
                    _ => 1.0,
                };
                Some(self.increment(data, increment))
            }
        }
    }

    fn match_state(&self, state: &TriggerableState, data: &mut TriggerData) -> Option<bool> {
        let last = data.last_state.as_ref();
        match self.event_type {
            EventType::Version => {
                let version = state.version_updated.as_ref()?;
                if last.and_then(|s| s.version_updated.as_ref()) == Some(version) {
                    return None;
                }
                if !self.predicate_matches(&serde_json::json!({ "version": version })) {
                    return None;
                }
            }
            EventType::ActiveSession => {
                let session = state.app_session_id.as_ref()?;
                if last.and_then(|s| s.app_session_id.as_ref()) == Some(session) {
                    return None;
                }
            }
            _ => return None,
        }

        data.last_state = Some(state.clone());
        Some(self.increment(data, 1.0))
    }

    fn predicate_matches(&self, value: &Value) -> bool {
        self.predicate.as_ref().map_or(true, |p| p.matches(value))
    }

    fn increment(&self, data: &mut TriggerData, by: f64) -> bool {
        data.count += by;
        data.count >= self.goal
    }
}

/// Lifecycle state of a schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    /// Waiting for its execution triggers
    #[default]
    Idle,
    /// Execution triggers fired, waiting for the delay
    Triggered,
    /// Prepared for execution
    Prepared,
    /// Paused
    Paused,
    /// Finished
    Finished,
}

/// Owning unit for one or more triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Schedule ID
    pub id: String,
    /// Optional group, used for bulk cancellation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Priority (lower fires first)
    #[serde(default)]
    pub priority: i32,
    /// Start of the validity window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    /// End of the validity window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Execution triggers
    pub triggers: Vec<Trigger>,
    /// Delay cancellation triggers
    #[serde(default)]
    pub cancellation_triggers: Vec<Trigger>,
    /// Frequency constraints consulted before the action runs
    #[serde(default)]
    pub frequency_constraint_ids: Vec<String>,
    /// Lifecycle state
    #[serde(default)]
    pub state: ScheduleState,
}

impl Schedule {
    /// Create an idle schedule
    pub fn new(id: impl Into<String>, triggers: Vec<Trigger>) -> Self {
        Self {
            id: id.into(),
            group: None,
            priority: 0,
            start: None,
            end: None,
            triggers,
            cancellation_triggers: Vec::new(),
            frequency_constraint_ids: Vec::new(),
            state: ScheduleState::Idle,
        }
    }

    /// Set group
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set validity window
    #[must_use]
    pub fn with_window(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Set delay cancellation triggers
    #[must_use]
    pub fn with_cancellation_triggers(mut self, triggers: Vec<Trigger>) -> Self {
        self.cancellation_triggers = triggers;
        self
    }

    /// Set frequency constraint IDs
    #[must_use]
    pub fn with_frequency_constraints(mut self, ids: Vec<String>) -> Self {
        self.frequency_constraint_ids = ids;
        self
    }

    /// Set lifecycle state
    #[must_use]
    pub fn with_state(mut self, state: ScheduleState) -> Self {
        self.state = state;
        self
    }
}

/// What a trigger firing means for its schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// Run the schedule's action
    Execution,
    /// Cancel a pending delay
    DelayCancellation,
}

impl ExecutionType {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionType::Execution => "execution",
            ExecutionType::DelayCancellation => "delay_cancellation",
        }
    }
}

/// Accumulated progress of one trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerData {
    /// Owning schedule
    pub schedule_id: String,
    /// Trigger ID
    pub trigger_id: String,
    /// Progress toward the goal
    pub count: f64,
    /// Last state seen by a state trigger
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<TriggerableState>,
}

impl TriggerData {
    /// Fresh progress record
    pub fn new(schedule_id: impl Into<String>, trigger_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            trigger_id: trigger_id.into(),
            count: 0.0,
            last_state: None,
        }
    }

    /// Set progress
    #[must_use]
    pub fn with_count(mut self, count: f64) -> Self {
        self.count = count;
        self
    }
}

/// Snapshot of the trigger that fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeringInfo {
    /// Trigger ID
    pub trigger_id: String,
    /// Trigger event type
    pub event_type: EventType,
    /// Trigger goal
    pub goal: f64,
    /// Progress at the moment the goal was reached
    pub count: f64,
    /// Payload of the event that completed the goal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    /// When the trigger fired
    pub date: DateTime<Utc>,
}

/// Fire decision emitted by the trigger processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    /// Schedule that should react
    pub schedule_id: String,
    /// Execution or delay cancellation
    pub execution_type: ExecutionType,
    /// Triggering snapshot
    pub info: TriggeringInfo,
}
