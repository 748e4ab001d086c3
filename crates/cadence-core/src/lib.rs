//! Cadence Core - Automation Engine
//!
//! This crate provides the decision core of the Cadence automation engine:
//! - Triggers: per-schedule trigger state machines that turn events into fire decisions
//! - Limits: sliding-window frequency constraints with a write-behind cache
//! - Retry: a bounded-concurrency, ordered-return dispatcher with backoff
//! - Storage: SQLite persistence for trigger progress and constraint history
//! - Clock: injectable wall-clock time source

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod limits;
pub mod retry;
pub mod storage;
pub mod triggers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};

// Re-export trigger module types
pub use triggers::{
    AutomationEvent, EventType, ExecutionType, PayloadMatcher, PreparedTrigger, Schedule,
    ScheduleState, Trigger, TriggerData, TriggerProcessor, TriggerResult, TriggerStore,
    TriggerableState, TriggeringInfo,
};

// Re-export frequency limit module types
pub use limits::{
    FrequencyChecker, FrequencyConstraint, FrequencyLimitManager, FrequencyStore, LimitError,
    LimitResult, Occurrence,
};

// Re-export retry module types
pub use retry::{RetryOutcome, RetryQueueConfig, RetryQueueError, RetryingQueue};

// Re-export storage module types
pub use storage::{SqliteAutomationStore, StorageError, StorageResult};
