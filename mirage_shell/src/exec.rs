use crate::error::Result;
use crate::session::{ERROR_LINE, write_flush};
use mirage_core::{AuditSink, CommandInterpreter, EventKind, SessionContext};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Answer a non-interactive `exec` request and return its exit status.
///
/// The interpreter's trailing prompt is dropped: `ssh host cmd` prints no
/// prompt.
pub async fn run_exec<I, T>(
    context: &SessionContext,
    interpreter: &mut I,
    audit: &dyn AuditSink,
    command: &str,
    stream: &mut T,
) -> Result<u32>
where
    I: CommandInterpreter + ?Sized,
    T: AsyncWrite + Unpin + Send,
{
    audit.record(
        context
            .event(EventKind::CommandExec)
            .with_username(&context.username)
            .with_command(command),
    );

    let status = match interpreter.interpret(command).await {
        Ok(output) => {
            let prompt = interpreter.prompt();
            let body = output.strip_suffix(prompt.as_str()).unwrap_or(&output);
            write_flush(stream, body.as_bytes()).await?;
            0
        }
        Err(e) => {
            warn!("Exec {command:?} failed for session {}: {e}", context.id);
            write_flush(stream, ERROR_LINE.as_bytes()).await?;
            1
        }
    };

    if let Err(e) = stream.shutdown().await {
        debug!("Channel shutdown failed for session {}: {e}", context.id);
    }
    Ok(status)
}
