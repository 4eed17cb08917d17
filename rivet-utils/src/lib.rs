pub mod activity;
pub mod middleware;

pub use activity::{ActivityLog, ActivityRecord, ActivitySink, MemoryActivitySink, TracingActivitySink};
pub use middleware::{log_at_level, CacheInvalidate, LogLevel, Logged, Timed};

pub mod prelude {
    //! Re-exports of the most commonly used utility middleware.
    pub use crate::{ActivityLog, CacheInvalidate, Logged, Timed};
}
