pub mod assigner;
pub mod availability;
pub mod capacity;
pub mod clock;
pub mod error;
pub mod interval;
pub mod logging;
pub mod machine;
pub mod operation;
pub mod persistence;
pub mod production;
pub mod sequencer;
pub mod validation;
pub mod window;

#[cfg(feature = "http_api")]
pub mod http_api;

pub use assigner::{AssignmentMode, ScheduleAssigner, ScheduleOutcome, ScheduleSummary};
pub use availability::MachineAvailability;
pub use capacity::{CapacityBucket, DailyCapacity};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ScheduleError, ScheduleResult};
pub use interval::{BusyInterval, StoredInterval};
pub use machine::MachineRegistry;
pub use operation::{Operation, ScheduledOperation};
pub use production::ProductionSchedule;
pub use sequencer::{ChainCursor, OperationSequencer};
pub use window::{Timestamp, WindowConfig, WorkWindow};
