//! In-memory trigger state machine

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{
    AutomationEvent, ExecutionType, Trigger, TriggerData, TriggerResult, TriggeringInfo,
};

/// Outcome of feeding one event to a [`PreparedTrigger`]
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerProcessOutcome {
    /// Progress after the event, ready to persist
    pub data: TriggerData,
    /// Fire decision, when the goal was reached
    pub result: Option<TriggerResult>,
}

/// A trigger bound to its schedule's window, priority and execution type,
/// together with its accumulated progress.
///
/// Starts disabled; the owning processor activates it according to the
/// schedule's lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTrigger {
    schedule_id: String,
    execution_type: ExecutionType,
    trigger: Trigger,
    data: TriggerData,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    priority: i32,
    active: bool,
}

impl PreparedTrigger {
    /// Bind a trigger, resuming from `data` when progress was persisted
    pub fn new(
        schedule_id: impl Into<String>,
        execution_type: ExecutionType,
        trigger: Trigger,
        data: Option<TriggerData>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        priority: i32,
    ) -> Self {
        let schedule_id = schedule_id.into();
        let data = data.unwrap_or_else(|| TriggerData::new(schedule_id.clone(), trigger.id.clone()));
        Self {
            schedule_id,
            execution_type,
            trigger,
            data,
            start,
            end,
            priority,
            active: false,
        }
    }

    /// Owning schedule
    #[must_use]
    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    /// Trigger ID
    #[must_use]
    pub fn trigger_id(&self) -> &str {
        &self.trigger.id
    }

    /// Execution type
    #[must_use]
    pub fn execution_type(&self) -> ExecutionType {
        self.execution_type
    }

    /// Trigger definition
    #[must_use]
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Current progress
    #[must_use]
    pub fn data(&self) -> &TriggerData {
        &self.data
    }

    /// Schedule priority
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether events are currently evaluated
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start evaluating events.
    ///
    /// Delay cancellation triggers restart from zero each time they are
    /// activated.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        if self.execution_type == ExecutionType::DelayCancellation {
            self.data.count = 0.0;
        }
    }

    /// Stop evaluating events, keeping progress
    pub fn disable(&mut self) {
        self.active = false;
    }

    /// Replace the definition and schedule attributes, keeping progress.
    ///
    /// Progress may now meet a lowered goal; the caller settles it with
    /// [`Self::reset_if_goal_met`].
    pub fn update(
        &mut self,
        trigger: Trigger,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        priority: i32,
    ) {
        self.trigger = trigger;
        self.start = start;
        self.end = end;
        self.priority = priority;
    }

    /// Drop progress that already meets the goal, which happens when a goal
    /// is lowered below stored progress. Returns whether progress was reset.
    pub(crate) fn reset_if_goal_met(&mut self) -> bool {
        if self.data.count == 0.0 || self.data.count < self.trigger.goal {
            return false;
        }
        self.data.count = 0.0;
        true
    }

    /// Feed an event.
    ///
    /// Returns `None` when the trigger is disabled, outside its window or the
    /// event does not match. Reaching the goal produces a result and resets
    /// progress to zero in the same pass.
    pub fn process(&mut self, event: &AutomationEvent, now: DateTime<Utc>) -> Option<TriggerProcessOutcome> {
        if !self.active || !self.is_within_window(now) {
            return None;
        }

        let reached = self.trigger.match_event(event, &mut self.data)?;
        if !reached {
            return Some(TriggerProcessOutcome {
                data: self.data.clone(),
                result: None,
            });
        }

        let result = TriggerResult {
            schedule_id: self.schedule_id.clone(),
            execution_type: self.execution_type,
            info: TriggeringInfo {
                trigger_id: self.trigger.id.clone(),
                event_type: self.trigger.event_type,
                goal: self.trigger.goal,
                count: self.data.count,
                event: event_payload(event),
                date: now,
            },
        };
        self.data.count = 0.0;

        Some(TriggerProcessOutcome {
            data: self.data.clone(),
            result: Some(result),
        })
    }

    fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| now >= start) && self.end.map_or(true, |end| now <= end)
    }
}

fn event_payload(event: &AutomationEvent) -> Option<Value> {
    match event {
        AutomationEvent::Event { data, .. } => data.clone(),
        AutomationEvent::StateChanged(state) => serde_json::to_value(state).ok(),
    }
}
