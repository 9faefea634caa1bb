//! Domain model (IDs, task definitions, records, events, decisions).

pub mod decision;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod state;
pub mod task;

pub use decision::{Decider, Decision, DefaultDecider};
pub use events::{TaskEvent, TaskEventKind};
pub use ids::TaskId;
pub use outcome::FetchResult;
pub use record::TaskRecord;
pub use state::TaskStatus;
pub use task::{Priority, TaskConstraints, TaskKind, TaskRequest};
