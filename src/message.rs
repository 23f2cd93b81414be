use serde_json::{Map, Value};

/// One control-loop sample streamed by the robot.
///
/// Missing numeric fields read as zero and a missing `run` reads as false.
/// `spd`, `kp` and `kd` keep their presence: the synchronizer only mirrors
/// them into [`crate::state::SessionState`] when the sample actually carried
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    /// Robot uptime in milliseconds.
    pub t: i64,
    /// Line position reading.
    pub pos: i32,
    /// Position error fed to the PID loop.
    pub err: i32,
    /// Left motor output.
    pub m1: i32,
    /// Right motor output.
    pub m2: i32,
    /// Live echo of the operating max speed, when present.
    pub spd: Option<i32>,
    /// Whether the control loop is running.
    pub run: bool,
    /// Live PID echoes, when present.
    pub kp: Option<f64>,
    pub kd: Option<f64>,
}

/// Authoritative parameter snapshot pushed by the robot. Absent fields mean
/// "unchanged": this is a partial-update merge, not a full replace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamSync {
    pub kp: Option<f64>,
    pub kd: Option<f64>,
    pub max_speed: Option<i32>,
    pub interval_ms: Option<i32>,
}

/// Lifecycle and acknowledgement statuses. Open set: firmware revisions are
/// free to invent new strings, which survive verbatim in `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Ready,
    Running,
    Stopped,
    Calibrating,
    CalibrationDone,
    PidOk,
    SpeedOk,
    IntervalOk,
    Error,
    Unknown,
    Other(String),
}

impl Status {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "READY" => Status::Ready,
            "RUNNING" => Status::Running,
            "STOPPED" => Status::Stopped,
            "CALIBRATING" => Status::Calibrating,
            "CALIBRATION_DONE" => Status::CalibrationDone,
            "PID_OK" => Status::PidOk,
            "SPEED_OK" => Status::SpeedOk,
            "INTERVAL_OK" => Status::IntervalOk,
            "ERROR" => Status::Error,
            "UNKNOWN" => Status::Unknown,
            other => Status::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Ready => "READY",
            Status::Running => "RUNNING",
            Status::Stopped => "STOPPED",
            Status::Calibrating => "CALIBRATING",
            Status::CalibrationDone => "CALIBRATION_DONE",
            Status::PidOk => "PID_OK",
            Status::SpeedOk => "SPEED_OK",
            Status::IntervalOk => "INTERVAL_OK",
            Status::Error => "ERROR",
            Status::Unknown => "UNKNOWN",
            Status::Other(s) => s,
        }
    }
}

/// A discrete lifecycle/ack event. `extra` holds the event-specific keys
/// (e.g. `kp`/`kd` on `PID_OK`).
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub status: Status,
    pub msg: String,
    pub extra: Map<String, Value>,
}

/// One classified inbound record. Every record maps to exactly one variant;
/// classification is total and never drops a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Telemetry(Telemetry),
    ParamSync(ParamSync),
    Status(StatusEvent),
    /// Any record that fails structured decoding, verbatim. Covers firmware
    /// boot banners and debug prints; not an error.
    RawText(String),
    /// Sentinel published by the reading thread when the port read fails,
    /// so the fault crosses the inbox like any other message.
    TransportLost,
}

/// Classify one record.
///
/// Precedence is fixed: a truthy `telem` wins, then a truthy `params`, then
/// a `status` string, then raw text. A record carrying both `telem` and
/// `status` is telemetry and the status is ignored; kept for wire
/// compatibility even though a record could legitimately want both.
pub fn classify(record: &str) -> Message {
    let value: Value = match serde_json::from_str(record) {
        Ok(v) => v,
        Err(_) => return Message::RawText(record.to_string()),
    };
    let Some(obj) = value.as_object() else {
        return Message::RawText(record.to_string());
    };

    if truthy(obj.get("telem")) {
        return Message::Telemetry(Telemetry {
            t: int_or(obj, "t", 0),
            pos: int_or(obj, "pos", 0) as i32,
            err: int_or(obj, "err", 0) as i32,
            m1: int_or(obj, "m1", 0) as i32,
            m2: int_or(obj, "m2", 0) as i32,
            spd: opt_int(obj, "spd").map(|v| v as i32),
            run: truthy(obj.get("run")),
            kp: opt_float(obj, "kp"),
            kd: opt_float(obj, "kd"),
        });
    }

    if truthy(obj.get("params")) {
        return Message::ParamSync(ParamSync {
            kp: opt_float(obj, "kp"),
            kd: opt_float(obj, "kd"),
            max_speed: opt_int(obj, "max_speed").map(|v| v as i32),
            interval_ms: opt_int(obj, "interval_ms").map(|v| v as i32),
        });
    }

    if let Some(Value::String(status)) = obj.get("status") {
        let msg = obj
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut extra = Map::new();
        for (k, v) in obj {
            if k != "status" && k != "msg" {
                extra.insert(k.clone(), v.clone());
            }
        }
        return Message::Status(StatusEvent {
            status: Status::from_wire(status),
            msg,
            extra,
        });
    }

    // Structured but unrecognized shape: reprint it as free text.
    Message::RawText(value.to_string())
}

/// JSON truthiness, matching what the firmware counts on: `1`, `true` and
/// non-empty strings are truthy; `0`, `false`, `null` and absence are not.
fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn int_or(obj: &Map<String, Value>, key: &str, default: i64) -> i64 {
    opt_int(obj, key).unwrap_or(default)
}

fn opt_int(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    let v = obj.get(key)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn opt_float(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}
