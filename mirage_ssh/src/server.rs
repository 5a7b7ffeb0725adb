use crate::handler::{ConnectionHandler, Shared};
use crate::{AuthPolicy, Result};
use mirage_config::ServerConfig;
use mirage_core::{AuditSink, EventKind, InterpreterFactory, SessionContext};
use russh::server::Config as SshConfig;
use russh::{MethodSet, SshId};
use russh_keys::key::KeyPair;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Accept loop for the honeypot.
///
/// Every connection runs on its own task. Whatever happens inside one is
/// logged and audited as `session_error`; the loop itself only stops when
/// its future is dropped.
pub struct HoneypotServer {
    ssh: Arc<SshConfig>,
    shared: Arc<Shared>,
}

impl HoneypotServer {
    pub fn new(
        server: ServerConfig,
        auth: AuthPolicy,
        host_key: KeyPair,
        interpreters: Arc<dyn InterpreterFactory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let ssh = SshConfig {
            server_id: SshId::Standard(server.ssh_banner.clone()),
            methods: MethodSet::PASSWORD,
            auth_rejection_time: Duration::from_secs(1),
            auth_rejection_time_initial: Some(Duration::ZERO),
            inactivity_timeout: Some(Duration::from_secs(30 * 60)),
            keys: vec![host_key],
            ..Default::default()
        };

        Self {
            ssh: Arc::new(ssh),
            shared: Arc::new(Shared {
                server,
                auth,
                interpreters,
                audit,
            }),
        }
    }

    pub async fn serve(self, address: &str) -> Result<()> {
        let listener = TcpListener::bind(address).await?;
        info!("SSH honeypot listening on {}", listener.local_addr()?);
        self.run(listener).await
    }

    pub async fn run(self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => self.spawn_connection(socket, peer),
                Err(e) => {
                    error!("Accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    fn spawn_connection(&self, socket: TcpStream, peer: SocketAddr) {
        let local = match socket.local_addr() {
            Ok(local) => local,
            Err(e) => {
                warn!("Dropping connection from {peer}: {e}");
                return;
            }
        };

        let context = SessionContext::new(peer, local);
        info!("Connection from {peer} (session {})", context.id);
        self.shared
            .audit
            .record(context.event(EventKind::SessionStart));

        let handler = ConnectionHandler::new(context.clone(), Arc::clone(&self.shared));
        let ssh = Arc::clone(&self.ssh);
        let audit = Arc::clone(&self.shared.audit);
        tokio::spawn(async move {
            if let Err(e) = drive_connection(ssh, socket, handler).await {
                warn!("Connection from {peer} ended with error: {e}");
                audit.record(
                    context
                        .event(EventKind::SessionError)
                        .with_message(e.to_string()),
                );
            }
            debug!("Connection closed for {peer}");
        });
    }
}

async fn drive_connection(
    ssh: Arc<SshConfig>,
    socket: TcpStream,
    handler: ConnectionHandler,
) -> Result<()> {
    let session = russh::server::run_stream(ssh, socket, handler).await?;
    session.await
}
