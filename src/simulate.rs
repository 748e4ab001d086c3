//! Scenario simulation
//!
//! Replays a scenario file through the engine against a manual clock:
//! constraints are synced, schedules restored, then each event is processed
//! and every execution decision is checked against the schedule's frequency
//! constraints and dispatched through the retrying queue.

use anyhow::{Context, Result};
use cadence_core::{
    AutomationEvent, ExecutionType, FrequencyConstraint, FrequencyLimitManager, ManualClock,
    RetryOutcome, RetryingQueue, Schedule, SqliteAutomationStore, TriggerProcessor,
    TriggerResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;

/// Scenario file contents
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Clock start, Unix milliseconds; current time when absent
    #[serde(default)]
    pub start_ms: Option<i64>,
    #[serde(default)]
    pub constraints: Vec<FrequencyConstraint>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scenario event
#[derive(Debug, Deserialize)]
pub struct Step {
    /// Milliseconds to advance the clock before the event
    #[serde(default)]
    pub advance_ms: i64,
    pub event: AutomationEvent,
}

/// Printed outcome of one fire decision
#[derive(Debug, Serialize, PartialEq)]
pub struct Decision {
    pub date: DateTime<Utc>,
    pub schedule_id: String,
    pub trigger_id: String,
    pub execution_type: ExecutionType,
    /// Whether the action passed its frequency constraints; always true for
    /// delay cancellations
    pub accepted: bool,
}

/// Parse a scenario file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid scenario {}", path.display()))
}

/// Run the `simulate` command
pub async fn run(input: &Path, config: &AppConfig) -> Result<()> {
    let scenario = load_scenario(input)?;
    let path = config.storage.resolve_path()?;
    let store = Arc::new(
        SqliteAutomationStore::new(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?,
    );

    let decisions = simulate(scenario, store, config).await?;
    for decision in &decisions {
        println!("{}", serde_json::to_string(decision)?);
    }
    info!(decisions = decisions.len(), "Simulation finished");
    Ok(())
}

/// Replay a scenario and collect the decisions
pub async fn simulate(
    scenario: Scenario,
    store: Arc<SqliteAutomationStore>,
    config: &AppConfig,
) -> Result<Vec<Decision>> {
    let clock = Arc::new(match scenario.start_ms {
        Some(ms) => ManualClock::from_millis(ms),
        None => ManualClock::new(Utc::now()),
    });

    let limits = FrequencyLimitManager::new(store.clone(), clock.clone());
    limits
        .set_constraints(scenario.constraints)
        .await
        .context("Failed to sync frequency constraints")?;

    let queue = RetryingQueue::new(config.retry.to_queue_config()?);

    let (processor, mut results) = TriggerProcessor::new(store, clock.clone());
    processor.set_paused(config.triggers.paused).await;

    let constraint_ids: HashMap<String, Vec<String>> = scenario
        .schedules
        .iter()
        .map(|s| (s.id.clone(), s.frequency_constraint_ids.clone()))
        .collect();
    processor.restore_schedules(scenario.schedules).await;

    let mut decisions = Vec::new();
    for step in scenario.steps {
        clock.advance(chrono::Duration::milliseconds(step.advance_ms));
        processor.process_event(step.event).await;

        let mut fired = Vec::new();
        while let Ok(result) = results.try_recv() {
            fired.push(result);
        }

        let mut accepted = Vec::new();
        for result in fired {
            let ids = constraint_ids
                .get(&result.schedule_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let allowed = match result.execution_type {
                ExecutionType::DelayCancellation => true,
                ExecutionType::Execution => match limits.get_frequency_checker(ids).await {
                    Ok(checker) => checker.check_and_increment(),
                    Err(e) => {
                        warn!(schedule_id = %result.schedule_id, error = %e, "Frequency check failed");
                        false
                    }
                },
            };
            accepted.push((result, allowed));
        }

        let dispatched = accepted
            .into_iter()
            .map(|(result, allowed)| dispatch(&queue, result, allowed));
        decisions.extend(futures::future::join_all(dispatched).await.into_iter().flatten());
    }

    limits.flush().await;
    Ok(decisions)
}

async fn dispatch(queue: &RetryingQueue, result: TriggerResult, accepted: bool) -> Option<Decision> {
    let decision = Decision {
        date: result.info.date,
        schedule_id: result.schedule_id.clone(),
        trigger_id: result.info.trigger_id.clone(),
        execution_type: result.execution_type,
        accepted,
    };
    if !accepted {
        return Some(decision);
    }

    let name = format!("{}:{}", result.schedule_id, result.execution_type.as_str());
    match queue
        .run(&name, || async {
            Ok::<_, Infallible>(RetryOutcome::success(()))
        })
        .await
    {
        Ok(()) => Some(decision),
        Err(e) => {
            warn!(schedule_id = %result.schedule_id, error = %e, "Dispatch cancelled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn scenario(value: serde_json::Value) -> Scenario {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_simulation_applies_frequency_limits() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteAutomationStore::new(dir.path().join("sim.db"))
                .await
                .unwrap(),
        );

        let scenario = scenario(json!({
            "start_ms": 0,
            "constraints": [{"id": "hourly", "range_ms": 3_600_000, "count": 1}],
            "schedules": [{
                "id": "promo",
                "triggers": [{"id": "fg", "type": "foreground", "goal": 2}],
                "frequency_constraint_ids": ["hourly"]
            }],
            "steps": [
                {"event": {"kind": "event", "event_type": "foreground"}},
                {"event": {"kind": "event", "event_type": "foreground"}},
                {"advance_ms": 60_000, "event": {"kind": "event", "event_type": "foreground"}},
                {"event": {"kind": "event", "event_type": "foreground"}},
                {"advance_ms": 3_600_000, "event": {"kind": "event", "event_type": "foreground"}},
                {"event": {"kind": "event", "event_type": "foreground"}}
            ]
        }));

        let decisions = simulate(scenario, store, &AppConfig::default()).await.unwrap();
        let accepted: Vec<bool> = decisions.iter().map(|d| d.accepted).collect();
        assert_eq!(accepted, vec![true, false, true]);
        assert!(decisions.iter().all(|d| d.schedule_id == "promo"));
    }

    #[tokio::test]
    async fn test_unknown_constraint_rejects_execution() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteAutomationStore::new(dir.path().join("sim.db"))
                .await
                .unwrap(),
        );

        let scenario = scenario(json!({
            "start_ms": 0,
            "schedules": [{
                "id": "s",
                "triggers": [{"id": "t", "type": "app_init", "goal": 1}],
                "frequency_constraint_ids": ["missing"]
            }],
            "steps": [{"event": {"kind": "event", "event_type": "app_init"}}]
        }));

        let decisions = simulate(scenario, store, &AppConfig::default()).await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].accepted);
    }
}
