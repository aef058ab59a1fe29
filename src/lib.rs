#![deny(unused_must_use)]
#![deny(unsafe_code)]
#![allow(clippy::new_without_default)]

pub mod anchor;
pub mod apis;
pub mod config;
pub mod report;
pub mod schedule;
mod trade;

pub use schedule::{RunResult, Scheduler, Settings, State, Stopped};
pub use trade::*;

/// Every tick succeeded.
pub const EXIT_SUCCESS: i32 = 0;
/// A tick failed on every attempt.
pub const EXIT_RETRIES_EXHAUSTED: i32 = -1;
/// The run was misconfigured and nothing was attempted.
pub const EXIT_CONFIGURATION: i32 = -2;
/// A report failed in a way retrying cannot fix.
pub const EXIT_FAILURE: i32 = -3;
