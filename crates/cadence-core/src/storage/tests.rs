
    use super::*;
    use crate::limits::{FrequencyConstraint, FrequencyStore, Occurrence};
    use crate::triggers::{TriggerData, TriggerStore, TriggerableState};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    struct TestContext {
        store: SqliteAutomationStore,
        _dir: TempDir,
    }

    async fn create_test_context() -> TestContext {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("automation.db");
        let store = SqliteAutomationStore::new(&path).await.unwrap();
        TestContext { store, _dir: dir }
    }

    fn occurrence(id: &str, millis: i64) -> Occurrence {
        Occurrence::new(id, Utc.timestamp_millis_opt(millis).unwrap())
    }

    #[tokio::test]
    async fn test_upsert_and_get_trigger() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        assert!(store.get_trigger("s1", "t1").await.unwrap().is_none());

        let mut data = TriggerData::new("s1", "t1").with_count(2.0);
        data.last_state = Some(TriggerableState {
            app_session_id: Some("session".to_string()),
            version_updated: None,
        });
        store.upsert_triggers(&[data.clone()]).await.unwrap();
        assert_eq!(store.get_trigger("s1", "t1").await.unwrap(), Some(data.clone()));

        data.count = 3.5;
        data.last_state = None;
        store.upsert_triggers(&[data.clone()]).await.unwrap();
        assert_eq!(store.get_trigger("s1", "t1").await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_trigger_deletes() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        store
            .upsert_triggers(&[
                TriggerData::new("a", "t1"),
                TriggerData::new("a", "t2"),
                TriggerData::new("b", "t1"),
                TriggerData::new("c", "t1"),
            ])
            .await
            .unwrap();

        store.delete_triggers("a", &["t2".to_string()]).await.unwrap();
        assert!(store.get_trigger("a", "t2").await.unwrap().is_none());
        assert!(store.get_trigger("a", "t1").await.unwrap().is_some());

        store.delete_schedule_triggers(&["b".to_string()]).await.unwrap();
        assert!(store.get_trigger("b", "t1").await.unwrap().is_none());

        store.delete_triggers_excluding(&["a".to_string()]).await.unwrap();
        assert!(store.get_trigger("a", "t1").await.unwrap().is_some());
        assert!(store.get_trigger("c", "t1").await.unwrap().is_none());

        store.delete_triggers_excluding(&[]).await.unwrap();
        assert!(store.get_trigger("a", "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_constraint_round_trip() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        let daily = FrequencyConstraint::new("daily", Duration::from_secs(86_400), 1);
        let hourly = FrequencyConstraint::new("hourly", Duration::from_millis(3_600_000), 5);
        store.upsert_constraint(&hourly).await.unwrap();
        store.upsert_constraint(&daily).await.unwrap();

        assert_eq!(store.get_constraint("daily").await.unwrap(), Some(daily.clone()));
        assert_eq!(store.get_all_constraints().await.unwrap(), vec![daily, hourly]);
        assert!(store.get_constraint("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_occurrences_sorted_and_cascade_deleted() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        store
            .upsert_constraint(&FrequencyConstraint::new("c", Duration::from_millis(10), 2))
            .await
            .unwrap();
        store
            .insert_occurrences(&[occurrence("c", 30), occurrence("c", 10), occurrence("c", 20)])
            .await
            .unwrap();

        let times: Vec<i64> = store
            .get_occurrences("c")
            .await
            .unwrap()
            .iter()
            .map(|o| o.timestamp.timestamp_millis())
            .collect();
        assert_eq!(times, vec![10, 20, 30]);

        store.delete_constraints(&["c".to_string()]).await.unwrap();
        assert!(store.get_constraint("c").await.unwrap().is_none());
        assert!(store.get_occurrences("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_constraint_keeps_history() {
        let ctx = create_test_context().await;
        let store = &ctx.store;

        store
            .upsert_constraint(&FrequencyConstraint::new("c", Duration::from_millis(10), 2))
            .await
            .unwrap();
        store.insert_occurrences(&[occurrence("c", 1)]).await.unwrap();
        store
            .upsert_constraint(&FrequencyConstraint::new("c", Duration::from_millis(10), 5))
            .await
            .unwrap();

        assert_eq!(store.get_occurrences("c").await.unwrap().len(), 1);

        store.delete_occurrences(&["c".to_string()]).await.unwrap();
        assert!(store.get_occurrences("c").await.unwrap().is_empty());
        assert_eq!(store.get_constraint("c").await.unwrap().unwrap().count, 5);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SqliteAutomationStore::in_memory().await.unwrap();
        store
            .upsert_triggers(&[TriggerData::new("s", "t").with_count(1.0)])
            .await
            .unwrap();
        assert_eq!(store.get_trigger("s", "t").await.unwrap().unwrap().count, 1.0);
    }

    #[test]
    fn test_default_path() {
        if let Ok(path) = SqliteAutomationStore::default_path() {
            assert!(path.ends_with(".cadence/automation.db"));
        }
    }
