//! Trigger processing
//!
//! Converts inbound automation events into fire decisions for schedules.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   events   ┌──────────────────┐   TriggerResult   ┌──────────┐
//! │   Caller     │ ─────────► │ TriggerProcessor │ ────────────────► │ Consumer │
//! └──────────────┘            └────────┬─────────┘                   └──────────┘
//!                                      │ progress
//!                                      ▼
//!                             ┌──────────────────┐
//!                             │   TriggerStore   │
//!                             └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let (processor, mut results) = TriggerProcessor::new(store, clock);
//! processor.update_schedules(vec![schedule]).await;
//! processor.process_event(AutomationEvent::event(EventType::Foreground)).await;
//! while let Ok(result) = results.try_recv() {
//!     println!("{} fired", result.schedule_id);
//! }
//! ```

mod predicate;
mod prepared;
mod processor;
mod store;
mod types;

pub use predicate::PayloadMatcher;
pub use prepared::{PreparedTrigger, TriggerProcessOutcome};
pub use processor::TriggerProcessor;
pub use store::TriggerStore;
pub use types::{
    AutomationEvent, EventType, ExecutionType, Schedule, ScheduleState, Trigger, TriggerData,
    TriggerResult, TriggerableState, TriggeringInfo,
};
