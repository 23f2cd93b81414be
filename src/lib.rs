//! Serial telemetry/command link for the Zumo line follower.
//!
//! The robot streams single-line JSON records (telemetry samples, parameter
//! snapshots, status events) over a serial port and accepts line-oriented
//! text commands back. This crate is the transport-decoupling core shared by
//! the front ends: a reader thread turns the raw byte stream into classified
//! [`message::Message`]s behind a non-blocking inbox, while the consumer
//! folds them into a [`state::SessionState`] mirror on its own schedule.

pub mod command;
pub mod framer;
pub mod message;
pub mod port;
pub mod session;
pub mod state;

pub use command::Command;
pub use framer::LineFramer;
pub use message::{classify, Message, ParamSync, Status, StatusEvent, Telemetry};
pub use session::{Session, SessionError, SessionStatus};
pub use state::{apply, SessionState, TelemetryHistory};
