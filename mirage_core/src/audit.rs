//! Audit events describing what a peer did during a session.
//!
//! Events are fire-and-forget: a sink that cannot record an event logs the
//! failure and returns, it never aborts the session that produced it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    ClientVersion,
    LoginSuccess,
    LoginFailed,
    CommandInput,
    CommandExec,
    SessionDisconnect,
    SessionTerminated,
    SessionError,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    pub session_id: Uuid,
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        kind: EventKind,
        session_id: Uuid,
        source: SocketAddr,
        destination: SocketAddr,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: kind,
            session_id,
            src_ip: source.ip().to_string(),
            src_port: source.port(),
            dst_ip: destination.ip().to_string(),
            dst_port: destination.port(),
            username: None,
            password: None,
            command: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    #[must_use]
    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Destination for audit events. Must tolerate concurrent callers.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

fn emit_tracing(line: &str) {
    info!(target: "audit", "{line}");
}

/// Emits each event as a JSON line through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => emit_tracing(&line),
            Err(e) => warn!("Failed to serialize audit event: {e}"),
        }
    }
}

enum WriterCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Appends one JSON object per line to a file and mirrors it to `tracing`.
///
/// `record` only queues the line; a background task owns the file, so slow
/// disks never stall the connection tasks.
pub struct JsonLinesAuditSink {
    commands: mpsc::UnboundedSender<WriterCommand>,
}

impl JsonLinesAuditSink {
    /// Open (or create) the log and start its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Audit log: {}", path.display());

        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(write_lines(File::from_std(file), receiver));

        Ok(Self { commands })
    }

    /// Wait until every event recorded so far has reached the file.
    pub async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        if self.commands.send(WriterCommand::Flush(done)).is_ok() {
            let _ = flushed.await;
        }
    }
}

async fn write_lines(file: File, mut commands: mpsc::UnboundedReceiver<WriterCommand>) {
    let mut out = BufWriter::new(file);
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Line(line) => {
                if let Err(e) = out.write_all(format!("{line}\n").as_bytes()).await {
                    warn!("Failed to write audit event: {e}");
                }
                if commands.is_empty() {
                    flush_log(&mut out).await;
                }
            }
            WriterCommand::Flush(done) => {
                flush_log(&mut out).await;
                let _ = done.send(());
            }
        }
    }
    flush_log(&mut out).await;
}

async fn flush_log(out: &mut BufWriter<File>) {
    if let Err(e) = out.flush().await {
        warn!("Failed to flush audit log: {e}");
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: AuditEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize audit event: {e}");
                return;
            }
        };

        emit_tracing(&line);

        if self.commands.send(WriterCommand::Line(line)).is_err() {
            warn!("Audit writer stopped, dropping event");
        }
    }
}
