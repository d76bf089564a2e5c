/// Follow-up record and status state machine
pub mod record;

/// Input DTOs
pub mod inputs;

/// Scheduling validation
pub mod validate;

/// Store boundary
pub mod store;

/// HTTP store client
pub mod http_store;

/// In-memory store
pub mod memory;

/// Reminder dispatch
pub mod dispatch;

/// Workflow engine
pub mod engine;

pub use dispatch::{DispatchError, DispatchReceipt, ReminderDispatcher, ReminderMessage, WhatsAppDispatcher};
pub use engine::{BulkSendOutcome, FollowUpEngine};
pub use http_store::HttpFollowUpStore;
pub use inputs::{BulkReminderInput, ScheduleFollowUpInput, UpdateFollowUpInput};
pub use memory::MemoryFollowUpStore;
pub use record::{FollowUp, FollowUpStatus, ReminderStatus, ENTITY};
pub use store::{FollowUpChanges, FollowUpFilter, FollowUpStore, NewFollowUp, Page, ReminderOutcome};
