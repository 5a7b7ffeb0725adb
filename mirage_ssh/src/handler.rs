//! Per-connection SSH callbacks.
//!
//! Channels are parked on open and handed to a spawned task once the peer
//! asks for a shell or an exec; the callbacks themselves never block on the
//! conversation so russh can keep pumping channel data.

use crate::{AuthPolicy, Error, Result};
use async_trait::async_trait;
use mirage_config::ServerConfig;
use mirage_core::{AuditSink, EventKind, InterpreterFactory, SessionContext};
use mirage_shell::{ShellSession, run_exec};
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, Disconnect, Pty};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared by every connection of one server.
pub(crate) struct Shared {
    pub server: ServerConfig,
    pub auth: AuthPolicy,
    pub interpreters: Arc<dyn InterpreterFactory>,
    pub audit: Arc<dyn AuditSink>,
}

impl Shared {
    fn host_for(&self, context: &SessionContext) -> String {
        self.server
            .hostname
            .clone()
            .unwrap_or_else(|| context.destination.ip().to_string())
    }

    fn record_error(&self, context: &SessionContext, error: &dyn std::fmt::Display) {
        warn!("Session {} from {} failed: {error}", context.id, context.source);
        self.audit.record(
            context
                .event(EventKind::SessionError)
                .with_username(&context.username)
                .with_message(error.to_string()),
        );
    }
}

pub struct ConnectionHandler {
    context: SessionContext,
    shared: Arc<Shared>,
    channels: HashMap<ChannelId, Channel<Msg>>,
    version_recorded: bool,
}

impl ConnectionHandler {
    pub(crate) fn new(context: SessionContext, shared: Arc<Shared>) -> Self {
        Self {
            context,
            shared,
            channels: HashMap::new(),
            version_recorded: false,
        }
    }

    /// Audit the peer's SSH identification string, once per connection.
    fn record_client_version(&mut self, session: &Session) {
        if self.version_recorded {
            return;
        }
        self.version_recorded = true;

        let version = String::from_utf8_lossy(session.remote_sshid()).into_owned();
        info!("Client version from {}: {version}", self.context.source);
        self.shared.audit.record(
            self.context
                .event(EventKind::ClientVersion)
                .with_username(&self.context.username)
                .with_message(version),
        );
    }
}

#[async_trait]
impl Handler for ConnectionHandler {
    type Error = Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth> {
        // The last submitted name is the identity, accepted or not.
        self.context.username = user.to_string();

        let accepted = self.shared.auth.allows(user, password);
        info!(
            "Login attempt {user}:{password} from {} - {}",
            self.context.source,
            if accepted { "SUCCESS" } else { "FAILED" }
        );

        let kind = if accepted {
            EventKind::LoginSuccess
        } else {
            EventKind::LoginFailed
        };
        self.shared
            .audit
            .record(self.context.event(kind).with_credentials(user, password));

        Ok(if accepted {
            Auth::Accept
        } else {
            Auth::Reject {
                proceed_with_methods: None,
            }
        })
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool> {
        self.record_client_version(session);
        debug!("Session channel {:?} opened by {}", channel.id(), self.context.source);
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<()> {
        debug!(
            "PTY request from {}: {term} {col_width}x{row_height}",
            self.context.source
        );
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(&mut self, channel_id: ChannelId, session: &mut Session) -> Result<()> {
        let Some(channel) = self.channels.remove(&channel_id) else {
            session.channel_failure(channel_id);
            return Ok(());
        };
        session.channel_success(channel_id);
        info!("Shell request from {}", self.context.source);

        let handle = session.handle();
        let shared = Arc::clone(&self.shared);
        let context = self.context.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_shell(&shared, &context, channel).await {
                shared.record_error(&context, &e);
            }
            close_channel(&handle, channel_id).await;
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, String::new(), "en".to_string())
                .await
            {
                debug!("Disconnect failed for session {}: {e:?}", context.id);
            }
        });
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<()> {
        let Some(channel) = self.channels.remove(&channel_id) else {
            session.channel_failure(channel_id);
            return Ok(());
        };
        session.channel_success(channel_id);

        let command = String::from_utf8_lossy(data).into_owned();
        info!("Exec request from {}: {command:?}", self.context.source);

        let handle = session.handle();
        let shared = Arc::clone(&self.shared);
        let context = self.context.clone();
        tokio::spawn(async move {
            let status = match serve_exec(&shared, &context, channel, &command).await {
                Ok(status) => status,
                Err(e) => {
                    shared.record_error(&context, &e);
                    1
                }
            };
            if handle.exit_status_request(channel_id, status).await.is_err() {
                debug!("Could not send exit status for session {}", context.id);
            }
            close_channel(&handle, channel_id).await;
        });
        Ok(())
    }
}

async fn serve_shell(
    shared: &Shared,
    context: &SessionContext,
    channel: Channel<Msg>,
) -> anyhow::Result<()> {
    let host = shared.host_for(context);
    let interpreter = shared.interpreters.open(&context.username, &host).await?;

    let exit = ShellSession::new(context.clone(), interpreter, Arc::clone(&shared.audit))
        .with_banner(shared.server.motd.clone())
        .run(channel.into_stream())
        .await?;

    debug!("Shell for session {} ended: {exit:?}", context.id);
    Ok(())
}

async fn serve_exec(
    shared: &Shared,
    context: &SessionContext,
    channel: Channel<Msg>,
    command: &str,
) -> anyhow::Result<u32> {
    let host = shared.host_for(context);
    let mut interpreter = shared.interpreters.open(&context.username, &host).await?;
    let mut stream = channel.into_stream();

    let status = run_exec(
        context,
        &mut interpreter,
        shared.audit.as_ref(),
        command,
        &mut stream,
    )
    .await?;
    Ok(status)
}

async fn close_channel(handle: &Handle, channel: ChannelId) {
    if handle.close(channel).await.is_err() {
        debug!("Channel {channel:?} already closed");
    }
}
