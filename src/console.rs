//! Interactive terminal front end. Thin adapter: all protocol logic lives in
//! the library; this module only turns messages into prints and input lines
//! into commands.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use zumolink::command::Command;
use zumolink::message::{Message, Status};
use zumolink::session::Session;
use zumolink::state::{apply, SessionState, TelemetryHistory};

use crate::cli::Cli;

/// Consumer tick: how often the inbox and the input line queue are drained.
const TICK: Duration = Duration::from_millis(50);

/// Grace period after open, the MCU resets when the port is asserted.
const SETTLE: Duration = Duration::from_secs(2);

const HELP: &str = "\
commands:
  start              start line following
  stop               stop the robot
  pid <kp> <kd>      set PID gains          e.g. pid 0.3 8.0
  speed <0-400>      set max speed          e.g. speed 300
  interval <ms>      telemetry every N ms   e.g. interval 50
  params             ask the robot for its parameters
  raw <text>         send a line verbatim
  status             local link/robot state
  log [n]            last n telemetry samples (default 10)
  help               this help
  quit / exit / q    leave";

pub fn run(args: Cli) -> Result<()> {
    let mut session = Session::open(&args.ser.port, args.ser.baud)
        .with_context(|| format!("connecting to {}", args.ser.port))?;
    println!("connected to {} @ {} baud", args.ser.port, args.ser.baud);

    let mut state = SessionState {
        connected: true,
        ..SessionState::default()
    };
    let mut history = TelemetryHistory::new(args.history);

    println!("waiting for robot reset...");
    thread::sleep(SETTLE);
    startup_commands(&args, &mut session);

    println!("{}", HELP);
    let input = spawn_stdin_reader();
    prompt();

    loop {
        for msg in session.poll() {
            apply(&msg, &mut state, &mut history);
            render(&msg, &state);
        }

        match input.try_recv() {
            Ok(line) => {
                if dispatch(line.trim(), &mut session, &state, &history) {
                    break;
                }
                prompt();
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break, // stdin closed
        }

        thread::sleep(TICK);
    }

    session.close();
    println!("disconnected");
    Ok(())
}

fn startup_commands(args: &Cli, session: &mut Session) {
    match (args.kp, args.kd) {
        (Some(kp), Some(kd)) => send(session, &Command::SetPid { kp, kd }),
        (Some(_), None) | (None, Some(_)) => {
            println!("  ! --kp and --kd must be given together, ignoring")
        }
        (None, None) => {}
    }
    if let Some(speed) = args.speed {
        if (0..=400).contains(&speed) {
            send(session, &Command::SetSpeed(speed));
        } else {
            println!("  ! --speed must be 0-400, ignoring");
        }
    }
    if let Some(ms) = args.interval {
        if (10..=10_000).contains(&ms) {
            send(session, &Command::SetInterval(ms));
        } else {
            println!("  ! --interval must be 10-10000 ms, ignoring");
        }
    }
    if args.autostart {
        send(session, &Command::Start);
    }
}

/// Returns true when the user asked to quit.
fn dispatch(line: &str, session: &mut Session, state: &SessionState, history: &TelemetryHistory) -> bool {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return false;
    };
    let rest: Vec<&str> = parts.collect();

    match cmd.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => return true,
        "help" => println!("{}", HELP),
        "start" => send(session, &Command::Start),
        "stop" => send(session, &Command::Stop),
        "params" => send(session, &Command::QueryParams),
        "pid" => match parse_pid(&rest) {
            Some((kp, kd)) => send(session, &Command::SetPid { kp, kd }),
            None => println!("  ! usage: pid <kp> <kd>   e.g. pid 0.3 8.0"),
        },
        "speed" => match rest.first().and_then(|s| s.parse::<i32>().ok()) {
            Some(v) if (0..=400).contains(&v) => send(session, &Command::SetSpeed(v)),
            _ => println!("  ! usage: speed <0-400>"),
        },
        "interval" => match rest.first().and_then(|s| s.parse::<i32>().ok()) {
            Some(ms) if (10..=10_000).contains(&ms) => send(session, &Command::SetInterval(ms)),
            _ => println!("  ! usage: interval <10-10000>"),
        },
        "raw" => {
            if rest.is_empty() {
                println!("  ! usage: raw <text>");
            } else {
                send(session, &Command::Raw(rest.join(" ")));
            }
        }
        "status" => print_status(state),
        "log" => {
            let n = rest
                .first()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(10);
            print_log(history, n);
        }
        other => println!("  ! unknown command '{}', try help", other),
    }
    false
}

fn send(session: &mut Session, cmd: &Command) {
    let text = cmd.to_string();
    match session.send(&text) {
        Ok(()) => println!("  -> {}", text),
        Err(e) => println!("  ! send failed: {}", e),
    }
}

fn render(msg: &Message, state: &SessionState) {
    match msg {
        Message::Telemetry(t) => {
            let run = if t.run { "RUN " } else { "STOP" };
            print!(
                "\r  t={:>7}ms {} pos={:>5} err={:>+5} m1={:>4} m2={:>4} #{}   ",
                t.t, run, t.pos, t.err, t.m1, t.m2, state.telem_count
            );
            let _ = io::stdout().flush();
        }
        Message::ParamSync(_) => {
            println!(
                "\n  params: kp={} kd={} max_speed={} interval={}ms",
                state.kp, state.kd, state.max_speed, state.interval_ms
            );
        }
        Message::Status(ev) => {
            let text = match &ev.status {
                Status::Ready => format!("robot ready. {}", ev.msg),
                Status::Running => "robot started".to_string(),
                Status::Stopped => "robot stopped".to_string(),
                Status::Calibrating => "calibrating sensors...".to_string(),
                Status::CalibrationDone => "calibration done".to_string(),
                Status::PidOk => format!("pid updated: kp={} kd={}", state.kp, state.kd),
                Status::SpeedOk => format!("max speed -> {}", state.max_speed),
                Status::IntervalOk => format!("telemetry interval -> {} ms", state.interval_ms),
                Status::Error => format!("robot error: {}", ev.msg),
                Status::Unknown => format!("robot did not understand: {}", ev.msg),
                Status::Other(s) => format!("{} {}", s, ev.msg),
            };
            println!("\n  * {}", text);
        }
        Message::RawText(line) => println!("\n  > {}", line),
        Message::TransportLost => {
            println!("\n  ! serial connection lost, 'quit' and reconnect");
        }
    }
}

fn print_status(state: &SessionState) {
    println!("  link      : {}", if state.connected { "connected" } else { "LOST" });
    println!("  robot     : {}", if state.running { "RUNNING" } else { "STOPPED" });
    println!("  kp / kd   : {} / {}", state.kp, state.kd);
    println!("  max speed : {}", state.max_speed);
    println!("  interval  : {} ms", state.interval_ms);
    println!("  samples   : {}", state.telem_count);
}

fn print_log(history: &TelemetryHistory, n: usize) {
    if history.is_empty() {
        println!("  no telemetry yet");
        return;
    }
    println!("  {:>8}  {:>5}  {:>6}  {:>4}  {:>4}  state", "t(ms)", "pos", "err", "m1", "m2");
    let skip = history.len().saturating_sub(n);
    for t in history.iter().skip(skip) {
        println!(
            "  {:>8}  {:>5}  {:>+6}  {:>4}  {:>4}  {}",
            t.t,
            t.pos,
            t.err,
            t.m1,
            t.m2,
            if t.run { "RUN" } else { "STOP" }
        );
    }
}

fn parse_pid(rest: &[&str]) -> Option<(f64, f64)> {
    let kp = rest.first()?.parse::<f64>().ok()?;
    let kd = rest.get(1)?.parse::<f64>().ok()?;
    Some((kp, kd))
}

fn prompt() {
    print!("zumo> ");
    let _ = io::stdout().flush();
}

/// Blocking stdin reads happen on their own thread; the main loop polls the
/// channel so it can keep draining telemetry between keystrokes.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
