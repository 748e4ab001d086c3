//! End-to-end flows over a real SQLite database

use cadence_core::{
    AutomationEvent, EventType, ExecutionType, FrequencyConstraint, FrequencyLimitManager,
    FrequencyStore, ManualClock, RetryOutcome, RetryQueueConfig, RetryingQueue, Schedule,
    SqliteAutomationStore, Trigger, TriggerProcessor, TriggerStore,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct TestContext {
    store: Arc<SqliteAutomationStore>,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

async fn create_test_context() -> TestContext {
    let dir = TempDir::new().unwrap();
    let store = SqliteAutomationStore::new(dir.path().join("automation.db"))
        .await
        .unwrap();
    TestContext {
        store: Arc::new(store),
        clock: Arc::new(ManualClock::from_millis(1_700_000_000_000)),
        _dir: dir,
    }
}

#[tokio::test]
async fn test_goal_of_three_fires_once_on_third_event() {
    let ctx = create_test_context().await;
    let (processor, mut results) = TriggerProcessor::new(ctx.store.clone(), ctx.clock.clone());
    processor
        .update_schedules(vec![Schedule::new(
            "welcome",
            vec![Trigger::new("three-events", EventType::CustomEvent, 3.0)],
        )])
        .await;

    for expected in [0, 0, 1] {
        processor
            .process_event(AutomationEvent::event(EventType::CustomEvent))
            .await;
        let mut fired = Vec::new();
        while let Ok(result) = results.try_recv() {
            fired.push(result);
        }
        assert_eq!(fired.len(), expected);
        if let Some(result) = fired.first() {
            assert_eq!(result.schedule_id, "welcome");
            assert_eq!(result.execution_type, ExecutionType::Execution);
            assert_eq!(result.info.count, 3.0);
        }
    }
}

#[tokio::test]
async fn test_progress_survives_restart() {
    let ctx = create_test_context().await;
    let schedule = Schedule::new("s1", vec![Trigger::new("t1", EventType::Foreground, 2.0)]);

    {
        let (processor, mut results) =
            TriggerProcessor::new(ctx.store.clone(), ctx.clock.clone());
        processor.restore_schedules(vec![schedule.clone()]).await;
        processor
            .process_event(AutomationEvent::event(EventType::Foreground))
            .await;
        assert!(results.try_recv().is_err());
    }

    let persisted = ctx.store.get_trigger("s1", "t1").await.unwrap().unwrap();
    assert_eq!(persisted.count, 1.0);

    let (processor, mut results) = TriggerProcessor::new(ctx.store.clone(), ctx.clock.clone());
    processor.restore_schedules(vec![schedule]).await;
    processor
        .process_event(AutomationEvent::event(EventType::Foreground))
        .await;
    assert_eq!(results.try_recv().unwrap().schedule_id, "s1");
}

#[tokio::test]
async fn test_fire_decisions_respect_frequency_limits() {
    let ctx = create_test_context().await;
    let limits = FrequencyLimitManager::new(ctx.store.clone(), ctx.clock.clone());
    limits
        .set_constraints(vec![FrequencyConstraint::new(
            "daily",
            Duration::from_secs(86_400),
            1,
        )])
        .await
        .unwrap();

    let (processor, mut results) = TriggerProcessor::new(ctx.store.clone(), ctx.clock.clone());
    processor
        .update_schedules(vec![Schedule::new(
            "promo",
            vec![Trigger::new("open", EventType::AppInit, 1.0)],
        )
        .with_frequency_constraints(vec!["daily".to_string()])])
        .await;

    let mut accepted = 0;
    for _ in 0..3 {
        processor
            .process_event(AutomationEvent::event(EventType::AppInit))
            .await;
        let result = results.try_recv().unwrap();
        let checker = limits
            .get_frequency_checker(&["daily".to_string()])
            .await
            .unwrap();
        if checker.check_and_increment() {
            accepted += 1;
        }
        assert_eq!(result.schedule_id, "promo");
    }
    assert_eq!(accepted, 1);

    limits.flush().await;
    assert_eq!(ctx.store.get_occurrences("daily").await.unwrap().len(), 1);

    ctx.clock.advance(chrono::Duration::days(1) + chrono::Duration::milliseconds(1));
    let checker = limits
        .get_frequency_checker(&["daily".to_string()])
        .await
        .unwrap();
    assert!(!checker.is_over_limit());
}

#[tokio::test(start_paused = true)]
async fn test_actions_dispatched_through_queue_in_order() {
    let queue = RetryingQueue::new(RetryQueueConfig::default());
    let names = ["first", "second", "third"];

    let runs = names.iter().enumerate().map(|(i, name)| {
        let queue = &queue;
        async move {
            queue
                .run(name, move || async move {
                    tokio::time::sleep(Duration::from_millis(30 - 10 * i as u64)).await;
                    Ok::<_, Infallible>(RetryOutcome::success(*name))
                })
                .await
                .unwrap()
        }
    });
    let delivered = futures::future::join_all(runs).await;

    assert_eq!(delivered, names);
}
