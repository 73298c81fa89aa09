//! Line-oriented transport over the sink's byte stream
//!
//! [`LineTransport`] owns the stream opened by a [`Connector`] and a
//! dedicated reader thread. The reader decodes one ISO-8859-1 line at a
//! time and hands it to the registered [`LineHandler`] on its own thread,
//! in wire order. The stream ends with exactly one `on_closed` or
//! `on_lost` call.
//!
//! Outbound lines are checked against the mote's receive buffer before
//! anything is written, and writers are serialized so frames from
//! concurrent callers never interleave.

use super::codec::{decode_latin1, encode_latin1, trim_line_ending};
use super::connector::{Connector, LinkIo};
use crate::config::LinkConfig;
use crate::error::{PredVisError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::{BufRead, BufReader, Read, Write};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Receives everything the reader thread sees. Called on the reader thread.
pub trait LineHandler: Send + Sync {
    /// One decoded line, without its terminator
    fn on_line(&self, line: &str);

    /// The remote end closed the stream, or the link was closed locally
    fn on_closed(&self);

    /// The stream failed or could not be opened
    fn on_lost(&self, error: PredVisError);
}

/// Per-connection flags shared with that connection's reader
#[derive(Default)]
struct LinkFlags {
    stop: AtomicBool,
    /// Cleared by the reader just before its terminal callback
    alive: AtomicBool,
}

/// Reader thread plus its completion signal
struct ReaderThread {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Line transport bound to one connector
pub struct LineTransport {
    connector: Box<dyn Connector>,
    /// Outbound ceiling in bytes, newline included
    buffer_size: usize,
    join_timeout: Duration,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<ReaderThread>>,
    flags: Mutex<Arc<LinkFlags>>,
}

impl LineTransport {
    pub fn new(connector: Box<dyn Connector>, buffer_size: usize, join_timeout: Duration) -> Self {
        Self {
            connector,
            buffer_size,
            join_timeout,
            writer: Mutex::new(None),
            child: Mutex::new(None),
            reader: Mutex::new(None),
            flags: Mutex::new(Arc::new(LinkFlags::default())),
        }
    }

    pub fn from_config(connector: Box<dyn Connector>, config: &LinkConfig) -> Self {
        Self::new(connector, config.buffer_size, config.join_timeout())
    }

    /// Largest outbound line in bytes, newline included
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Whether the stream is open and the reader is still running.
    /// Never waits on the writer, so it answers while a send is stalled.
    pub fn is_open(&self) -> bool {
        let flags = crate::lock(&self.flags);
        flags.alive.load(Ordering::SeqCst) && !flags.stop.load(Ordering::SeqCst)
    }

    /// Open the stream and start the reader thread.
    ///
    /// A failure to open is reported to `handler.on_lost` and returned; the
    /// reader thread is not started in that case.
    pub fn connect(&self, handler: Arc<dyn LineHandler>) -> Result<()> {
        if self.is_open() {
            return Err(PredVisError::Transport("link is already open".to_string()));
        }
        // Tear down whatever is left of a link that ended on its own
        self.close();
        let flags = Arc::new(LinkFlags::default());
        *crate::lock(&self.flags) = flags.clone();

        let LinkIo {
            reader,
            writer,
            child,
        } = match self.connector.open() {
            Ok(io) => io,
            Err(e) => {
                tracing::error!("Failed to open {}: {}", self.connector.describe(), e);
                handler.on_lost(PredVisError::Transport(transport_message(&e)));
                return Err(e);
            }
        };

        *crate::lock(&self.writer) = Some(writer);
        *crate::lock(&self.child) = child;

        let (done_tx, done_rx) = bounded(1);
        flags.alive.store(true, Ordering::SeqCst);
        let thread_flags = flags.clone();
        let thread_handler = handler.clone();
        let spawned = std::thread::Builder::new()
            .name("link reader".to_string())
            .spawn(move || {
                read_loop(reader, thread_handler.as_ref(), &thread_flags);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                *crate::lock(&self.reader) = Some(ReaderThread {
                    handle,
                    done: done_rx,
                });
                tracing::info!("Connected to {}", self.connector.describe());
                Ok(())
            }
            Err(e) => {
                flags.alive.store(false, Ordering::SeqCst);
                self.close();
                let message = format!("Failed to spawn reader: {}", e);
                handler.on_lost(PredVisError::Transport(message.clone()));
                Err(PredVisError::Transport(message))
            }
        }
    }

    /// Send one line. Nothing is written if it does not fit the mote buffer.
    pub fn send(&self, line: &str) -> Result<()> {
        self.send_all(std::slice::from_ref(&line))
    }

    /// Send several lines as one uninterrupted frame.
    ///
    /// Every line is checked before the first byte is written, so a
    /// `MessageTooLong` never leaves a partial frame on the wire.
    pub fn send_all<S: AsRef<str>>(&self, lines: &[S]) -> Result<()> {
        let encoded = lines
            .iter()
            .map(|line| self.encode(line.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        // A link that failed or closed stays down until the next connect
        if !crate::lock(&self.flags).alive.load(Ordering::SeqCst) {
            return Err(PredVisError::NotConnected);
        }

        let mut guard = crate::lock(&self.writer);
        let writer = guard.as_mut().ok_or(PredVisError::NotConnected)?;
        for bytes in &encoded {
            writer.write_all(bytes)?;
            writer.flush()?;
        }
        Ok(())
    }

    fn encode(&self, line: &str) -> Result<Vec<u8>> {
        if line.contains('\n') {
            return Err(PredVisError::InvalidFormat(
                "outbound line contains a newline".to_string(),
            ));
        }

        let mut bytes = encode_latin1(line);
        bytes.push(b'\n');
        if bytes.len() > self.buffer_size {
            return Err(PredVisError::MessageTooLong {
                length: bytes.len(),
                limit: self.buffer_size,
            });
        }
        Ok(bytes)
    }

    /// Close the link. Idempotent and safe from any thread, including the reader.
    ///
    /// The link process is killed before the writer lock is taken: a send
    /// stalled on a full pipe holds that lock until the pipe breaks.
    pub fn close(&self) {
        crate::lock(&self.flags).stop.store(true, Ordering::SeqCst);

        if let Some(mut child) = crate::lock(&self.child).take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    tracing::debug!("Failed to kill link process: {}", e);
                }
            }
            let _ = child.wait();
        }

        if let Some(mut writer) = crate::lock(&self.writer).take() {
            let _ = writer.flush();
        }

        let Some(reader) = crate::lock(&self.reader).take() else {
            return;
        };

        if reader.handle.thread().id() == std::thread::current().id() {
            // Closing from a handler callback; the loop exits after it returns
            return;
        }

        match reader.done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if reader.handle.join().is_err() {
                    tracing::warn!("Link reader thread panicked");
                }
                tracing::info!("Closed {}", self.connector.describe());
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Link reader did not stop within {:?}, detaching it",
                    self.join_timeout
                );
            }
        }
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// The bare message of a transport error, so it is not wrapped twice
fn transport_message(error: &PredVisError) -> String {
    match error {
        PredVisError::Transport(message) => message.clone(),
        other => other.to_string(),
    }
}

fn read_loop(
    reader: Box<dyn Read + Send>,
    handler: &dyn LineHandler,
    flags: &LinkFlags,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                tracing::info!("Serial connection to sink closed");
                flags.alive.store(false, Ordering::SeqCst);
                handler.on_closed();
                return;
            }
            Ok(_) => {
                if flags.stop.load(Ordering::SeqCst) {
                    flags.alive.store(false, Ordering::SeqCst);
                    handler.on_closed();
                    return;
                }
                let line = decode_latin1(trim_line_ending(&buf));
                tracing::trace!("<- {}", line);
                handler.on_line(&line);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                flags.alive.store(false, Ordering::SeqCst);
                if flags.stop.load(Ordering::SeqCst) {
                    handler.on_closed();
                } else {
                    tracing::error!("Lost connection to sink: {}", e);
                    handler.on_lost(PredVisError::Io(e));
                }
                return;
            }
        }
    }
}
