//! Trigger processor
//!
//! Owns every [`PreparedTrigger`] and turns inbound events into ordered fire
//! decisions:
//!
//! ```text
//! event ──► PreparedTrigger × N ──► sort by priority ──► result stream
//!                   │
//!                   └──► TriggerStore::upsert_triggers (best effort)
//! ```
//!
//! All public operations take a single lock over the processor state, so
//! callers on different tasks observe them in a total order.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::prepared::PreparedTrigger;
use super::store::TriggerStore;
use super::types::{
    AutomationEvent, ExecutionType, Schedule, ScheduleState, TriggerData, TriggerResult,
    TriggerableState,
};
use crate::clock::Clock;

#[derive(Default)]
struct ProcessorState {
    prepared: BTreeMap<String, Vec<PreparedTrigger>>,
    groups: HashMap<String, HashSet<String>>,
    last_state: Option<TriggerableState>,
    paused: bool,
}

impl ProcessorState {
    fn forget_schedule(&mut self, schedule_id: &str) {
        self.prepared.remove(schedule_id);
        self.groups.retain(|_, ids| {
            ids.remove(schedule_id);
            !ids.is_empty()
        });
    }
}

/// Per-schedule trigger state machines
pub struct TriggerProcessor {
    store: Arc<dyn TriggerStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<ProcessorState>,
    results: mpsc::UnboundedSender<TriggerResult>,
}

impl TriggerProcessor {
    /// Create a processor and the stream its fire decisions are sent to
    pub fn new(
        store: Arc<dyn TriggerStore>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<TriggerResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let processor = Self {
            store,
            clock,
            state: Mutex::new(ProcessorState::default()),
            results: tx,
        };
        (processor, rx)
    }

    /// Pause or resume event processing
    pub async fn set_paused(&self, paused: bool) {
        self.state.lock().await.paused = paused;
        info!(paused, "Trigger processing pause state changed");
    }

    /// Whether event processing is paused
    pub async fn is_paused(&self) -> bool {
        self.state.lock().await.paused
    }

    /// Evaluate an event against every prepared trigger.
    ///
    /// While paused the event is dropped; a state change is still remembered
    /// so it can be re-fed when triggers are activated later.
    pub async fn process_event(&self, event: AutomationEvent) {
        let mut state = self.state.lock().await;

        if let AutomationEvent::StateChanged(triggerable) = &event {
            state.last_state = Some(triggerable.clone());
        }

        if state.paused {
            debug!("Trigger processing paused, dropping event");
            return;
        }

        let now = self.clock.now();
        let mut results = Vec::new();
        let mut touched = Vec::new();
        for triggers in state.prepared.values_mut() {
            evaluate(triggers.iter_mut(), &event, now, &mut results, &mut touched);
        }

        self.emit_and_persist(results, touched).await;
    }

    /// Reconcile the prepared triggers with the desired schedules
    pub async fn update_schedules(&self, schedules: Vec<Schedule>) {
        let mut state = self.state.lock().await;
        self.sync_schedules(&mut state, schedules).await;
    }

    /// Apply a schedule lifecycle state to its triggers
    pub async fn update_schedule_state(&self, schedule_id: &str, schedule_state: ScheduleState) {
        let mut state = self.state.lock().await;
        self.apply_state(&mut state, schedule_id, schedule_state).await;
    }

    /// Remove schedules and their persisted progress
    pub async fn cancel(&self, schedule_ids: &[String]) {
        let mut state = self.state.lock().await;
        for schedule_id in schedule_ids {
            state.forget_schedule(schedule_id);
        }

        if let Err(e) = self.store.delete_schedule_triggers(schedule_ids).await {
            warn!(error = %e, count = schedule_ids.len(), "Failed to delete schedule triggers");
        }
        debug!(count = schedule_ids.len(), "Cancelled schedules");
    }

    /// Remove every schedule tagged with `group`
    pub async fn cancel_group(&self, group: &str) {
        let mut state = self.state.lock().await;
        let Some(ids) = state.groups.remove(group) else {
            debug!(group, "No schedules in group");
            return;
        };

        let ids: Vec<String> = ids.into_iter().collect();
        for schedule_id in &ids {
            state.forget_schedule(schedule_id);
        }

        if let Err(e) = self.store.delete_schedule_triggers(&ids).await {
            warn!(error = %e, group, "Failed to delete group triggers");
        }
        debug!(group, count = ids.len(), "Cancelled group");
    }

    /// Startup hydration: reconcile, then drop persisted progress of
    /// schedules that no longer exist
    pub async fn restore_schedules(&self, schedules: Vec<Schedule>) {
        let mut state = self.state.lock().await;
        let active: Vec<String> = schedules.iter().map(|s| s.id.clone()).collect();
        self.sync_schedules(&mut state, schedules).await;

        if let Err(e) = self.store.delete_triggers_excluding(&active).await {
            warn!(error = %e, "Failed to delete orphaned triggers");
        }
        info!(count = active.len(), "Restored schedules");
    }

    /// Snapshot of the prepared triggers of a schedule
    pub async fn prepared_triggers(&self, schedule_id: &str) -> Vec<PreparedTrigger> {
        self.state
            .lock()
            .await
            .prepared
            .get(schedule_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn sync_schedules(&self, state: &mut ProcessorState, mut schedules: Vec<Schedule>) {
        schedules.sort_by_key(|s| s.priority);
        for schedule in &schedules {
            self.sync_schedule(state, schedule).await;
            self.apply_state(state, &schedule.id, schedule.state).await;
        }
    }

    async fn sync_schedule(&self, state: &mut ProcessorState, schedule: &Schedule) {
        let mut existing: HashMap<String, PreparedTrigger> = state
            .prepared
            .remove(&schedule.id)
            .unwrap_or_default()
            .into_iter()
            .map(|t| (t.trigger_id().to_string(), t))
            .collect();

        let definitions = schedule
            .triggers
            .iter()
            .map(|t| (t, ExecutionType::Execution))
            .chain(
                schedule
                    .cancellation_triggers
                    .iter()
                    .map(|t| (t, ExecutionType::DelayCancellation)),
            );

        let mut prepared = Vec::new();
        let mut reset = Vec::new();
        for (trigger, execution_type) in definitions {
            let reused = existing
                .remove(&trigger.id)
                .filter(|p| p.execution_type() == execution_type);

            let mut trigger = match reused {
                Some(mut current) => {
                    current.update(trigger.clone(), schedule.start, schedule.end, schedule.priority);
                    current
                }
                None => {
                    let data = self.load_trigger_data(&schedule.id, &trigger.id).await;
                    PreparedTrigger::new(
                        schedule.id.clone(),
                        execution_type,
                        trigger.clone(),
                        data,
                        schedule.start,
                        schedule.end,
                        schedule.priority,
                    )
                }
            };
            if trigger.reset_if_goal_met() {
                reset.push(trigger.data().clone());
            }
            prepared.push(trigger);
        }

        if !reset.is_empty() {
            debug!(
                schedule_id = %schedule.id,
                reset = reset.len(),
                "Reset progress past lowered goal"
            );
            if let Err(e) = self.store.upsert_triggers(&reset).await {
                warn!(
                    schedule_id = %schedule.id,
                    error = %e,
                    "Failed to persist reset trigger progress"
                );
            }
        }

        let stale: Vec<String> = existing
            .into_keys()
            .filter(|id| !prepared.iter().any(|p| p.trigger_id() == id))
            .collect();
        if !stale.is_empty() {
            if let Err(e) = self.store.delete_triggers(&schedule.id, &stale).await {
                warn!(schedule_id = %schedule.id, error = %e, "Failed to delete stale triggers");
            }
        }

        state.groups.retain(|_, ids| {
            ids.remove(&schedule.id);
            !ids.is_empty()
        });
        if let Some(group) = &schedule.group {
            state
                .groups
                .entry(group.clone())
                .or_default()
                .insert(schedule.id.clone());
        }

        debug!(
            schedule_id = %schedule.id,
            triggers = prepared.len(),
            stale = stale.len(),
            "Synced schedule triggers"
        );
        state.prepared.insert(schedule.id.clone(), prepared);
    }

    async fn load_trigger_data(&self, schedule_id: &str, trigger_id: &str) -> Option<TriggerData> {
        match self.store.get_trigger(schedule_id, trigger_id).await {
            Ok(data) => data,
            Err(e) => {
                warn!(schedule_id, trigger_id, error = %e, "Failed to load trigger progress");
                None
            }
        }
    }

    async fn apply_state(
        &self,
        state: &mut ProcessorState,
        schedule_id: &str,
        schedule_state: ScheduleState,
    ) {
        let paused = state.paused;
        let last_state = state.last_state.clone();
        let Some(triggers) = state.prepared.get_mut(schedule_id) else {
            debug!(schedule_id, "No prepared triggers for schedule");
            return;
        };

        let mut activated = false;
        for trigger in triggers.iter_mut() {
            let enable = match schedule_state {
                ScheduleState::Idle => trigger.execution_type() == ExecutionType::Execution,
                ScheduleState::Triggered | ScheduleState::Prepared => {
                    trigger.execution_type() == ExecutionType::DelayCancellation
                }
                ScheduleState::Paused | ScheduleState::Finished => false,
            };

            if !enable {
                trigger.disable();
            } else if !trigger.is_active() {
                trigger.activate();
                activated = true;
            }
        }

        if !activated || paused {
            return;
        }
        let Some(last_state) = last_state else {
            return;
        };

        let event = AutomationEvent::StateChanged(last_state);
        let now = self.clock.now();
        let mut results = Vec::new();
        let mut touched = Vec::new();
        evaluate(triggers.iter_mut(), &event, now, &mut results, &mut touched);

        self.emit_and_persist(results, touched).await;
    }

    async fn emit_and_persist(&self, mut results: Vec<(i32, TriggerResult)>, touched: Vec<TriggerData>) {
        results.sort_by_key(|(priority, _)| *priority);
        for (_, result) in results {
            info!(
                schedule_id = %result.schedule_id,
                trigger_id = %result.info.trigger_id,
                execution_type = result.execution_type.as_str(),
                "Trigger fired"
            );
            if self.results.send(result).is_err() {
                debug!("Trigger result receiver dropped");
            }
        }

        if touched.is_empty() {
            return;
        }
        if let Err(e) = self.store.upsert_triggers(&touched).await {
            warn!(error = %e, count = touched.len(), "Failed to persist trigger progress");
        }
    }
}

fn evaluate<'a>(
    triggers: impl Iterator<Item = &'a mut PreparedTrigger>,
    event: &AutomationEvent,
    now: DateTime<Utc>,
    results: &mut Vec<(i32, TriggerResult)>,
    touched: &mut Vec<TriggerData>,
) {
    for trigger in triggers {
        if let Some(outcome) = trigger.process(event, now) {
            touched.push(outcome.data);
            if let Some(result) = outcome.result {
                results.push((trigger.priority(), result));
            }
        }
    }
}
