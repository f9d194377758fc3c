//! Progress and achievement calculations.
//!
//! Everything here is pure: callers hand in a snapshot of assignments and a
//! [`CalcConfig`](crate::config::CalcConfig) and get numbers back. No I/O,
//! no logging, no shared state.

pub mod duration;
pub mod progress;
pub mod ratio;
pub mod stats;

pub use duration::true_duration;
pub use progress::{achieved_duration, achievement_rate, student_progress};
pub use stats::level_reach_counts;
