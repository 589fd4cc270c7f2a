//! Session record, gate state machine and watch-time tracking.

pub mod state;
pub mod watch;
