use serde_json::{Map, Value};
use std::collections::VecDeque;

use crate::message::{Message, Status, Telemetry};

/// Default telemetry history depth, about a minute of samples at the
/// default interval.
pub const DEFAULT_HISTORY: usize = 500;

/// Local mirror of robot state. The robot is the source of truth: local
/// writes are optimistic and get overwritten whenever a contradicting
/// telemetry/param/status message arrives.
///
/// Owned exclusively by the consumer context; only [`apply`] mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub connected: bool,
    pub running: bool,
    pub kp: f64,
    pub kd: f64,
    pub max_speed: i32,
    pub interval_ms: i32,
    pub telem_count: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        // firmware defaults, shown until the robot pushes its own
        SessionState {
            connected: false,
            running: false,
            kp: 0.25,
            kd: 6.0,
            max_speed: 400,
            interval_ms: 100,
            telem_count: 0,
        }
    }
}

/// Fixed-capacity ring of recent telemetry samples, oldest evicted first.
/// Purely observational, never the source of correctness.
#[derive(Debug)]
pub struct TelemetryHistory {
    buf: VecDeque<Telemetry>,
    cap: usize,
}

impl TelemetryHistory {
    pub fn new(cap: usize) -> Self {
        TelemetryHistory {
            buf: VecDeque::with_capacity(cap.max(1)),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, sample: Telemetry) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn last(&self) -> Option<&Telemetry> {
        self.buf.back()
    }

    /// Samples in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Telemetry> {
        self.buf.iter()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

/// Fold one dequeued message into the mirror. Runs on the consumer's own
/// context, once per message.
pub fn apply(msg: &Message, state: &mut SessionState, history: &mut TelemetryHistory) {
    match msg {
        Message::Telemetry(t) => {
            state.telem_count += 1;
            state.running = t.run;
            if let Some(spd) = t.spd {
                state.max_speed = spd;
            }
            if let Some(kp) = t.kp {
                state.kp = kp;
            }
            if let Some(kd) = t.kd {
                state.kd = kd;
            }
            history.push(t.clone());
        }
        Message::ParamSync(p) => {
            if let Some(kp) = p.kp {
                state.kp = kp;
            }
            if let Some(kd) = p.kd {
                state.kd = kd;
            }
            if let Some(v) = p.max_speed {
                state.max_speed = v;
            }
            if let Some(ms) = p.interval_ms {
                state.interval_ms = ms;
            }
        }
        Message::Status(ev) => match ev.status {
            Status::Running => state.running = true,
            Status::Stopped => state.running = false,
            Status::PidOk => {
                if let Some(kp) = extra_f64(&ev.extra, "kp") {
                    state.kp = kp;
                }
                if let Some(kd) = extra_f64(&ev.extra, "kd") {
                    state.kd = kd;
                }
            }
            Status::SpeedOk => {
                if let Some(v) = extra_i32(&ev.extra, "max_speed") {
                    state.max_speed = v;
                }
            }
            Status::IntervalOk => {
                if let Some(ms) = extra_i32(&ev.extra, "interval_ms") {
                    state.interval_ms = ms;
                }
            }
            // everything else is display-only
            _ => {}
        },
        Message::RawText(_) => {}
        Message::TransportLost => {
            // parameters and history stay; they are the last known truth
            state.connected = false;
        }
    }
}

fn extra_f64(extra: &Map<String, Value>, key: &str) -> Option<f64> {
    extra.get(key).and_then(Value::as_f64)
}

fn extra_i32(extra: &Map<String, Value>, key: &str) -> Option<i32> {
    extra.get(key).and_then(Value::as_i64).map(|v| v as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::classify;

    fn fresh() -> (SessionState, TelemetryHistory) {
        let mut state = SessionState::default();
        state.connected = true;
        (state, TelemetryHistory::new(4))
    }

    #[test]
    fn telemetry_counts_and_mirrors() {
        let (mut state, mut history) = fresh();
        let msg =
            classify(r#"{"telem":1,"t":120,"pos":2500,"err":0,"m1":200,"m2":200,"spd":350,"run":1}"#);
        apply(&msg, &mut state, &mut history);
        assert_eq!(state.telem_count, 1);
        assert!(state.running);
        assert_eq!(state.max_speed, 350);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().map(|t| t.t), Some(120));
    }

    #[test]
    fn telemetry_without_spd_keeps_max_speed() {
        let (mut state, mut history) = fresh();
        state.max_speed = 300;
        apply(
            &classify(r#"{"telem":1,"t":5,"run":0}"#),
            &mut state,
            &mut history,
        );
        assert_eq!(state.max_speed, 300);
        assert!(!state.running);
    }

    #[test]
    fn param_sync_merges_partially() {
        let (mut state, mut history) = fresh();
        apply(
            &classify(r#"{"params":1,"kp":0.5}"#),
            &mut state,
            &mut history,
        );
        assert_eq!(state.kp, 0.5);
        assert_eq!(state.kd, 6.0);
        assert_eq!(state.max_speed, 400);
        assert_eq!(state.interval_ms, 100);
    }

    #[test]
    fn running_then_stopped() {
        let (mut state, mut history) = fresh();
        apply(&classify(r#"{"status":"RUNNING"}"#), &mut state, &mut history);
        assert!(state.running);
        apply(&classify(r#"{"status":"STOPPED"}"#), &mut state, &mut history);
        assert!(!state.running);
    }

    #[test]
    fn acks_merge_extra_values() {
        let (mut state, mut history) = fresh();
        apply(
            &classify(r#"{"status":"PID_OK","kp":0.35,"kd":9.5}"#),
            &mut state,
            &mut history,
        );
        apply(
            &classify(r#"{"status":"SPEED_OK","max_speed":280}"#),
            &mut state,
            &mut history,
        );
        apply(
            &classify(r#"{"status":"INTERVAL_OK","interval_ms":50}"#),
            &mut state,
            &mut history,
        );
        assert_eq!(state.kp, 0.35);
        assert_eq!(state.kd, 9.5);
        assert_eq!(state.max_speed, 280);
        assert_eq!(state.interval_ms, 50);
    }

    #[test]
    fn display_only_statuses_do_not_mutate() {
        let (mut state, mut history) = fresh();
        let before = state.clone();
        for line in [
            r#"{"status":"READY","msg":"v2"}"#,
            r#"{"status":"CALIBRATING"}"#,
            r#"{"status":"ERROR","msg":"sensor"}"#,
            r#"{"status":"SOMETHING_NEW"}"#,
        ] {
            apply(&classify(line), &mut state, &mut history);
        }
        assert_eq!(state, before);
        assert!(history.is_empty());
    }

    #[test]
    fn raw_text_is_inert() {
        let (mut state, mut history) = fresh();
        let before = state.clone();
        apply(&classify("not json at all"), &mut state, &mut history);
        assert_eq!(state, before);
        assert!(history.is_empty());
    }

    #[test]
    fn transport_lost_keeps_parameters() {
        let (mut state, mut history) = fresh();
        state.kp = 0.4;
        apply(&classify(r#"{"telem":1,"t":1}"#), &mut state, &mut history);
        apply(&Message::TransportLost, &mut state, &mut history);
        assert!(!state.connected);
        assert_eq!(state.kp, 0.4);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let (mut state, mut history) = fresh();
        for i in 0..6 {
            let msg = classify(&format!(r#"{{"telem":1,"t":{}}}"#, i));
            apply(&msg, &mut state, &mut history);
        }
        assert_eq!(history.len(), 4);
        let ts: Vec<i64> = history.iter().map(|t| t.t).collect();
        assert_eq!(ts, vec![2, 3, 4, 5]);
        assert_eq!(state.telem_count, 6);
    }
}
