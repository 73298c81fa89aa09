//! Connectors open the duplex byte stream behind a link
//!
//! [`SerialDumpConnector`] is the real thing: it spawns the serialdump tool
//! that bridges the sink mote's serial port to stdio. Anything else that can
//! produce a reader/writer pair (a TCP serial bridge, the in-memory
//! `MockLink` behind the `mock-link` feature) implements [`Connector`] too.

use crate::config::LinkConfig;
use crate::error::{PredVisError, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// The opened byte stream of a link
pub struct LinkIo {
    /// Bytes from the sink
    pub reader: Box<dyn Read + Send>,
    /// Bytes to the sink
    pub writer: Box<dyn Write + Send>,
    /// Child process owning the stream, terminated on close
    pub child: Option<Child>,
}

/// Opens the byte stream for a link
pub trait Connector: Send + Sync {
    /// Open a fresh stream. Called once per `connect`.
    fn open(&self) -> Result<LinkIo>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Spawns `<serialdump> -b<baud> <device>` and talks to it over stdio
#[derive(Debug, Clone)]
pub struct SerialDumpConnector {
    program: PathBuf,
    args: Vec<String>,
}

impl SerialDumpConnector {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.serialdump.clone(), config.serialdump_args())
    }
}

impl Connector for SerialDumpConnector {
    fn open(&self) -> Result<LinkIo> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PredVisError::Transport(format!("Failed to start '{}': {}", self.describe(), e))
            })?;

        let (Some(stdout), Some(stdin)) = (child.stdout.take(), child.stdin.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PredVisError::Transport(
                "serialdump stdio was not captured".to_string(),
            ));
        };

        if let Some(stderr) = child.stderr.take() {
            // serialdump reports device errors on stderr; keep the pipe drained
            let spawned = std::thread::Builder::new()
                .name("serialdump stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines() {
                        match line {
                            Ok(line) => tracing::debug!("serialdump: {}", line),
                            Err(_) => break,
                        }
                    }
                });
            if let Err(e) = spawned {
                tracing::warn!("Failed to spawn serialdump stderr reader: {}", e);
            }
        }

        tracing::info!("Started {} (pid {})", self.describe(), child.id());

        Ok(LinkIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }

    fn describe(&self) -> String {
        format!("{} {}", self.program.display(), self.args.join(" "))
    }
}
