//! Ports: traits for the collaborators the scheduler talks to.

pub mod clock;
pub mod event_sink;
pub mod platform;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, SinkError};
pub use self::platform::{NoopPlatformScheduler, PlatformError, PlatformScheduler, SchedulingHint};
