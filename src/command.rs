use std::fmt;

/// A user intent, encoded to the robot's line command grammar by `Display`.
///
/// Pure formatting: the encoder never touches the transport, callers hand
/// the string to [`crate::session::Session::send`]. Range validation
/// (`SPEED` 0..=400, `INTERVAL` 10..=10000 ms) is the caller's job; the
/// encoder formats whatever it is given.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    SetPid { kp: f64, kd: f64 },
    SetSpeed(i32),
    SetInterval(i32),
    QueryParams,
    /// Raw passthrough for anything the robot may choose to interpret.
    Raw(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => write!(f, "START"),
            Command::Stop => write!(f, "STOP"),
            Command::SetPid { kp, kd } => write!(f, "PID:{},{}", kp, kd),
            Command::SetSpeed(v) => write!(f, "SPEED:{}", v),
            Command::SetInterval(ms) => write!(f, "INTERVAL:{}", ms),
            Command::QueryParams => write!(f, "PARAMS"),
            Command::Raw(text) => write!(f, "{}", text),
        }
    }
}
