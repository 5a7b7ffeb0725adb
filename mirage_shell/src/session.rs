use crate::editor::{ERASE, KeyOutcome, LineEditor};
use crate::error::Result;
use mirage_core::{AuditSink, CommandInterpreter, EventKind, SessionContext};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Written instead of the model's answer when a command could not be served.
pub const ERROR_LINE: &str = "-bash: fork: retry: Resource temporarily unavailable\r\n";

/// Written when the peer closes its side of the channel.
pub const DISCONNECT_NOTICE: &str = "\r\nConnection closed by remote host.\r\n";

/// Written after `exit`.
pub const LOGOUT_NOTICE: &str = "logout\r\n";

/// How a shell session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellExit {
    /// The peer typed `exit`.
    Logout,
    /// The channel reached end of stream.
    PeerClosed,
}

/// One interactive shell bound to a channel.
pub struct ShellSession<I> {
    context: SessionContext,
    interpreter: I,
    audit: Arc<dyn AuditSink>,
    banner: String,
    editor: LineEditor,
}

impl<I: CommandInterpreter> ShellSession<I> {
    pub fn new(context: SessionContext, interpreter: I, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            context,
            interpreter,
            audit,
            banner: String::new(),
            editor: LineEditor::new(),
        }
    }

    /// Text written once before the first prompt.
    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Serve the channel until `exit`, end of stream or an I/O error.
    ///
    /// Reads one byte at a time so nothing is consumed ahead of what the
    /// peer actually typed. Interpreter failures are rendered in-band; only
    /// channel I/O errors end the session early, and even then the
    /// disconnect and termination events are recorded before returning.
    pub async fn run<T>(mut self, mut stream: T) -> Result<ShellExit>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        info!(
            "Shell opened for {} from {} (session {})",
            self.context.username, self.context.source, self.context.id
        );

        let outcome = self.serve_input(&mut stream).await;

        self.audit.record(
            self.context
                .event(EventKind::SessionDisconnect)
                .with_username(&self.context.username),
        );
        if let Err(e) = stream.shutdown().await {
            debug!("Channel shutdown failed for session {}: {e}", self.context.id);
        }
        self.audit
            .record(self.context.event(EventKind::SessionTerminated));

        match &outcome {
            Ok(exit) => info!("Shell closed for session {} ({exit:?})", self.context.id),
            Err(e) => warn!("Shell for session {} ended on I/O error: {e}", self.context.id),
        }
        outcome
    }

    async fn serve_input<T>(&mut self, stream: &mut T) -> Result<ShellExit>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut opening = std::mem::take(&mut self.banner);
        opening.push_str(&self.interpreter.prompt());
        write_flush(stream, opening.as_bytes()).await?;

        let mut byte = [0_u8; 1];
        loop {
            if stream.read(&mut byte).await? == 0 {
                write_flush(stream, DISCONNECT_NOTICE.as_bytes()).await?;
                return Ok(ShellExit::PeerClosed);
            }

            match self.editor.feed(byte[0]) {
                KeyOutcome::Echo(b) => write_flush(stream, &[b]).await?,
                KeyOutcome::Erase => write_flush(stream, ERASE).await?,
                KeyOutcome::Ignore => {}
                KeyOutcome::Submit(command) => {
                    write_flush(stream, b"\r\n").await?;
                    if self.dispatch(stream, &command).await? {
                        return Ok(ShellExit::Logout);
                    }
                }
            }
        }
    }

    /// Returns `true` when the session should end.
    async fn dispatch<T>(&mut self, stream: &mut T, command: &str) -> Result<bool>
    where
        T: AsyncWrite + Unpin + Send,
    {
        self.audit.record(
            self.context
                .event(EventKind::CommandInput)
                .with_username(&self.context.username)
                .with_command(command),
        );

        let reply = self.interpreter.interpret(command).await;

        if command.trim() == "exit" {
            if let Err(e) = reply {
                debug!("Interpreter failed on exit: {e}");
            }
            write_flush(stream, LOGOUT_NOTICE.as_bytes()).await?;
            return Ok(true);
        }

        match reply {
            Ok(output) => write_flush(stream, output.as_bytes()).await?,
            Err(e) => {
                warn!(
                    "Command {command:?} failed for session {}: {e}",
                    self.context.id
                );
                let mut fallback = ERROR_LINE.to_string();
                fallback.push_str(&self.interpreter.prompt());
                write_flush(stream, fallback.as_bytes()).await?;
            }
        }
        Ok(false)
    }
}

pub(crate) async fn write_flush<T>(stream: &mut T, bytes: &[u8]) -> std::io::Result<()>
where
    T: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}
