//! # Remote Jobs
//!
//! - `dispatch` - one job per engine preset, submitted and joined together
//! - `poller` - fixed-interval completion polling with an optional deadline

pub mod dispatch;
pub mod poller;

pub use dispatch::{Dispatcher, Job, SettledJob};
pub use poller::{Clock, PollConfig, PollState, Poller, TerminalPolicy, TokioClock};
