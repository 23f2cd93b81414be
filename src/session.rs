use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::framer::LineFramer;
use crate::message::{classify, Message};
use crate::port::{open_port, Transport};

/// Idle sleep between availability probes. Short enough to stay responsive,
/// long enough not to busy-spin.
const POLL_IDLE: Duration = Duration::from_millis(5);

/// How long `close` waits for the reader thread to notice the stop flag
/// before giving up and releasing the port anyway.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot open {dev}: {source}")]
    TransportUnavailable {
        dev: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial write failed: {0}")]
    SendFailed(#[source] io::Error),
    #[error("session is not open")]
    NotOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Faulted,
    Closed,
}

/// An open connection to the robot.
///
/// One dedicated reader thread owns the read half of the port and the line
/// framer exclusively; it classifies each record and pushes the result into
/// the inbox. The consumer drains the inbox with [`poll`](Session::poll) on
/// its own schedule and writes commands with [`send`](Session::send). The
/// two directions of the duplex handle never contend.
pub struct Session {
    writer: Option<Box<dyn Transport>>,
    inbox: Receiver<Message>,
    stop: Arc<AtomicBool>,
    reader_done: Arc<AtomicBool>,
    reader_fault: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    send_fault: bool,
}

impl Session {
    /// Open `dev` at `baud` and start the reader thread.
    pub fn open(dev: &str, baud: u32) -> Result<Self, SessionError> {
        let port = open_port(dev, baud).map_err(|source| SessionError::TransportUnavailable {
            dev: dev.to_string(),
            source,
        })?;
        // disjoint halves of the same duplex handle: the clone reads, the
        // original writes
        let reader_half = port
            .try_clone()
            .map_err(|source| SessionError::TransportUnavailable {
                dev: dev.to_string(),
                source,
            })?;
        debug!("opened {} @ {} baud", dev, baud);
        Ok(Self::attach(Box::new(reader_half), Box::new(port)))
    }

    /// Assemble a session over an already-open transport pair. `reader_half`
    /// is handed to the reader thread; `writer_half` stays with the consumer
    /// for sends. Seam for tests and non-serial transports.
    pub fn attach(reader_half: Box<dyn Transport>, writer_half: Box<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let reader_done = Arc::new(AtomicBool::new(false));
        let reader_fault = Arc::new(AtomicBool::new(false));

        let reader = {
            let stop = Arc::clone(&stop);
            let done = Arc::clone(&reader_done);
            let fault = Arc::clone(&reader_fault);
            thread::Builder::new()
                .name("zumolink-reader".into())
                .spawn(move || {
                    read_loop(reader_half, tx, &stop, &fault);
                    done.store(true, Ordering::Release);
                })
                .ok()
        };

        Session {
            writer: Some(writer_half),
            inbox: rx,
            stop,
            reader_done,
            reader_fault,
            reader,
            send_fault: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.writer.is_none() {
            SessionStatus::Closed
        } else if self.send_fault || self.reader_fault.load(Ordering::Acquire) {
            SessionStatus::Faulted
        } else {
            SessionStatus::Open
        }
    }

    /// Write one command line. Appends the newline and writes synchronously.
    /// A failure faults the session but queued inbound messages stay
    /// drainable; recovery is re-`open`.
    pub fn send(&mut self, cmd: &str) -> Result<(), SessionError> {
        let writer = self.writer.as_mut().ok_or(SessionError::NotOpen)?;
        let mut line = Vec::with_capacity(cmd.len() + 1);
        line.extend_from_slice(cmd.as_bytes());
        line.push(b'\n');
        debug!("tx: {}", cmd);
        if let Err(e) = writer.write_all(&line) {
            self.send_fault = true;
            return Err(SessionError::SendFailed(e));
        }
        Ok(())
    }

    /// Non-blocking drain of the inbox, in arrival order.
    pub fn poll(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return out,
            }
        }
    }

    /// Best-effort sends STOP, stops the reader and releases the port.
    /// Idempotent and safe from the faulted state.
    pub fn close(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if !self.send_fault && !self.reader_fault.load(Ordering::Acquire) {
            if let Err(e) = writer.write_all(b"STOP\n") {
                debug!("stop-on-close not delivered: {}", e);
            }
        }
        self.stop.store(true, Ordering::Release);

        let t0 = Instant::now();
        while !self.reader_done.load(Ordering::Acquire) {
            if t0.elapsed() >= CLOSE_GRACE {
                warn!("reader thread did not stop within {:?}", CLOSE_GRACE);
                break;
            }
            thread::sleep(POLL_IDLE);
        }
        if self.reader_done.load(Ordering::Acquire) {
            if let Some(handle) = self.reader.take() {
                let _ = handle.join();
            }
        } else {
            // leak the handle rather than block forever on a wedged driver
            self.reader = None;
        }
        drop(writer);
        debug!("session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reader thread body: probe, read what is available, frame, classify,
/// publish. Exits on the stop flag, on consumer hangup, or on an I/O fault
/// (after publishing the `TransportLost` sentinel). Never retries the port.
fn read_loop(
    mut port: Box<dyn Transport>,
    tx: Sender<Message>,
    stop: &AtomicBool,
    fault: &AtomicBool,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 1024];

    while !stop.load(Ordering::Acquire) {
        let avail = match port.bytes_to_read() {
            Ok(n) => n,
            Err(e) => {
                publish_lost(&tx, fault, &e);
                return;
            }
        };
        if avail == 0 {
            thread::sleep(POLL_IDLE);
            continue;
        }
        let want = avail.min(buf.len());
        let n = match port.read(&mut buf[..want]) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                publish_lost(&tx, fault, &e);
                return;
            }
        };
        for record in framer.feed(&buf[..n]) {
            debug!("rx: {}", record);
            if tx.send(classify(&record)).is_err() {
                // consumer dropped the session without close(); just exit
                return;
            }
        }
    }
}

fn publish_lost(tx: &Sender<Message>, fault: &AtomicBool, err: &io::Error) {
    warn!("serial read failed, connection lost: {}", err);
    fault.store(true, Ordering::Release);
    let _ = tx.send(Message::TransportLost);
}
