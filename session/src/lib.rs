//! Roll-call attendance sessions.
//!
//! # Architecture
//!
//! An attendance session walks a class roster one student at a time:
//!
//! ```text
//! start -> [roster fetch] -> [reference resolution]
//!       -> per student: capture -> energy gate -> embed -> decide -> publish
//!       -> stopped (roster exhausted or stop requested)
//! ```
//!
//! The walk runs as one background task per class, coordinated with the
//! control plane ([`AttendanceEngine::start`] / `pause` / `resume` /
//! [`AttendanceEngine::finish`]) through two atomic flags. Pausing is a
//! cooperative sleep-and-recheck wait that still observes stop requests;
//! cancellation never interrupts an in-flight capture or inference call.
//!
//! Live per-student status is published to a transient store collection
//! after every turn, which external pollers read through
//! [`AttendanceEngine::read_live`]. Nothing is written to permanent
//! storage until an operator calls `finish`; natural completion of the
//! roster leaves the session stopped but uncommitted.

pub mod config;
mod engine;
mod error;
pub mod keys;
pub mod resolver;
pub mod roster;
mod types;

pub use config::SessionConfig;
pub use engine::{AttendanceEngine, ControlOutcome, StartOutcome};
pub use error::SessionError;
pub use types::{AttendanceRecord, AttendanceStatus, SessionStatus, Student};
