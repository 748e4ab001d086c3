
    use super::*;

    #[test]
    fn test_missing_constraint_message() {
        let error: Error = LimitError::ConstraintNotFound("daily".to_string()).into();
        assert!(matches!(error, Error::Limit(LimitError::ConstraintNotFound(_))));
        assert!(error.to_string().contains("daily"));
    }

    #[test]
    fn test_storage_error_converts() {
        let error: Error = StorageError::InvalidData("bad row".to_string()).into();
        assert!(matches!(error, Error::Storage(_)));
        assert!(error.to_string().starts_with("storage error"));
    }

    #[test]
    fn test_cancellation_message() {
        let error: Error = RetryQueueError::Cancelled {
            name: "sync".to_string(),
        }
        .into();
        assert!(error.to_string().contains("sync"));
    }

    #[test]
    fn test_invalid_config_message() {
        let error = Error::InvalidConfig("max_backoff below initial_backoff".to_string());
        assert!(error.to_string().contains("max_backoff"));
    }
