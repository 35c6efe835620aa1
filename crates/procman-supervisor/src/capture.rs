//! Per-process output capture.
//!
//! Two reader threads (stdout, stderr) forward raw chunks into one unbounded
//! channel in arrival order. An assembler thread turns the merged byte stream
//! into lines, commits them to the session's buffer and decides when the
//! session is finished.
//!
//! The channel is unbounded. A stalled assembler grows memory instead of
//! blocking the child on a full pipe.

use std::any::Any;
use std::io;
use std::io::Read;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use procman_common::mutex_lock_or_recover;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::session::SessionCore;
use crate::types::ErrorDetail;
use crate::types::StreamSource;

const READ_CHUNK: usize = 4096;

#[derive(Debug)]
pub(crate) enum CaptureEvent {
    Data { source: StreamSource, bytes: Vec<u8> },
    Failed { source: StreamSource, reason: String },
}

/// Splits the merged byte stream into lines.
///
/// A line ends at `\n` (a preceding `\r` is dropped too). Bytes are decoded
/// lossily, so invalid UTF-8 becomes U+FFFD instead of failing the line.
#[derive(Debug, Default)]
pub(crate) struct LineAssembler {
    partial: Vec<u8>,
    after_flush: bool,
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl LineAssembler {
    /// Feed a chunk, returning every line it completed.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for piece in bytes.split_inclusive(|b| *b == b'\n') {
            let terminated = piece.last() == Some(&b'\n');
            // The terminator of a line already surfaced by `flush`.
            let closes_flushed = self.after_flush
                && self.partial.is_empty()
                && terminated
                && decode_line(piece).is_empty();
            self.after_flush = false;
            if closes_flushed {
                continue;
            }

            self.partial.extend_from_slice(piece);
            if terminated {
                lines.push(decode_line(&self.partial));
                self.partial.clear();
            }
        }
        lines
    }

    /// Emit the unterminated remainder, if any. Used on idle so prompts that
    /// never print a newline still become visible.
    pub(crate) fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        self.after_flush = true;
        Some(line)
    }
}

/// Handles to a running capture pipeline.
pub(crate) struct CapturePipeline {
    stop: Arc<AtomicBool>,
    assembler: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    pub(crate) fn spawn<O, E>(
        pid: u32,
        stdout: O,
        stderr: E,
        core: Arc<Mutex<SessionCore>>,
        poll_interval: Duration,
    ) -> io::Result<Self>
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();

        spawn_reader(pid, StreamSource::Stdout, stdout, tx.clone(), Arc::clone(&stop))?;
        spawn_reader(pid, StreamSource::Stderr, stderr, tx, Arc::clone(&stop))?;

        let assembler_stop = Arc::clone(&stop);
        let assembler = thread::Builder::new()
            .name(format!("procman-{}-assembler", pid))
            .spawn(move || {
                let guard_core = Arc::clone(&core);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    assemble(pid, rx, core, assembler_stop, poll_interval)
                }));
                if let Err(payload) = outcome {
                    let message = panic_message(payload.as_ref());
                    error!(pid, panic = %message, "Capture pipeline panicked");
                    mutex_lock_or_recover(&guard_core).fail(ErrorDetail::Message(format!(
                        "capture pipeline panicked: {}",
                        message
                    )));
                }
            });

        let assembler = match assembler {
            Ok(handle) => handle,
            Err(e) => {
                // Readers stop at their next checkpoint.
                stop.store(true, Ordering::Release);
                return Err(e);
            }
        };

        Ok(Self {
            stop,
            assembler: Some(assembler),
        })
    }

    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop and wait for the assembler. Readers are left to finish on their
    /// own: they are parked in `read` until the pipe closes.
    pub(crate) fn shutdown(&mut self) {
        self.stop();
        if let Some(handle) = self.assembler.take() {
            if handle.join().is_err() {
                error!("Assembler thread panicked outside the capture loop");
            }
        }
    }
}

fn spawn_reader<R>(
    pid: u32,
    source: StreamSource,
    stream: R,
    tx: Sender<CaptureEvent>,
    stop: Arc<AtomicBool>,
) -> io::Result<()>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("procman-{}-{}", pid, source))
        .spawn(move || read_stream(pid, source, stream, tx, stop))
        .map(|_| ())
}

fn read_stream<R: Read>(
    pid: u32,
    source: StreamSource,
    mut stream: R,
    tx: Sender<CaptureEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; READ_CHUNK];
    while !stop.load(Ordering::Acquire) {
        match stream.read(&mut buf) {
            Ok(0) => {
                debug!(pid, %source, "End of stream");
                break;
            }
            Ok(n) => {
                let event = CaptureEvent::Data {
                    source,
                    bytes: buf[..n].to_vec(),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(pid, %source, error = %e, "Error reading process output");
                let _ = tx.send(CaptureEvent::Failed {
                    source,
                    reason: e.to_string(),
                });
                break;
            }
        }
    }
    debug!(pid, %source, "Reader exiting");
}

fn assemble(
    pid: u32,
    rx: Receiver<CaptureEvent>,
    core: Arc<Mutex<SessionCore>>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut assembler = LineAssembler::default();
    let mut readers_done = false;
    let mut exit_seen = false;

    loop {
        if stop.load(Ordering::Acquire) {
            debug!(pid, "Assembler stopped");
            break;
        }

        if readers_done {
            // Nothing else can arrive; wait for the process itself.
            let mut core = mutex_lock_or_recover(&core);
            core.mark_drained();
            core.poll_exit();
            if core.try_finalize() {
                break;
            }
            drop(core);
            thread::sleep(poll_interval);
            continue;
        }

        match rx.recv_timeout(poll_interval) {
            Ok(CaptureEvent::Data { bytes, .. }) => {
                exit_seen = false;
                let lines = assembler.push(&bytes);
                if !lines.is_empty() {
                    mutex_lock_or_recover(&core).commit(lines);
                }
            }
            Ok(CaptureEvent::Failed { source, reason }) => {
                let mut core = mutex_lock_or_recover(&core);
                core.commit(assembler.flush());
                core.fail(ErrorDetail::Message(format!(
                    "{} reader failed: {}",
                    source, reason
                )));
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let mut core = mutex_lock_or_recover(&core);
                core.commit(assembler.flush());
                if core.poll_exit().is_some() {
                    // A descendant may hold the pipes open after the process
                    // exits; two idle ticks with an empty queue count as drained.
                    if exit_seen && rx.is_empty() {
                        core.mark_drained();
                        core.try_finalize();
                        break;
                    }
                    exit_seen = true;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                let mut core = mutex_lock_or_recover(&core);
                core.commit(assembler.flush());
                readers_done = true;
            }
        }
    }

    info!(pid, "Capture pipeline finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
