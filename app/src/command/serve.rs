use crate::command::CommandStrategy;
use mirage_config::Config;
use mirage_conversation::ConversationFactory;
use mirage_core::{AuditSink, JsonLinesAuditSink};
use mirage_history::{SqliteHistoryStore, spawn_expiry_sweep};
use mirage_providers::build_provider;
use mirage_ssh::{AuthPolicy, HoneypotServer, load_or_generate_host_key};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Input for the `serve` command.
pub struct ServeInput {
    pub address: String,
    pub port: u16,
    /// Config file override.
    pub config: Option<PathBuf>,
}

/// Runs the honeypot until Ctrl-C.
pub struct ServeStrategy;

impl CommandStrategy for ServeStrategy {
    type Input = ServeInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load(input.config.as_deref())?;
        info!(
            "Using provider {} with model {}",
            config.llm.provider, config.llm.model
        );

        let client = reqwest::Client::new();
        // Sessions still start without a working provider; each one fails on its own.
        if let Err(e) = build_provider(&config.llm, client.clone()) {
            warn!("LLM provider is not usable, every shell will fail to start: {e}");
        }

        let store = Arc::new(
            SqliteHistoryStore::open(
                &config.history.database_path,
                Duration::from_secs(config.history.ttl_secs),
            )
            .await?,
        );
        let sweep = spawn_expiry_sweep(
            store.clone(),
            Duration::from_secs(config.history.cleanup_interval_secs),
        );

        let audit_log = Arc::new(JsonLinesAuditSink::open(&config.audit.log_path)?);
        let audit: Arc<dyn AuditSink> = audit_log.clone();
        let interpreters = Arc::new(ConversationFactory::new(config.llm.clone(), client, store));
        let auth = AuthPolicy::from_config(&config.auth)?;
        let host_key = load_or_generate_host_key(&config.server.host_key_path)?;

        let server = HoneypotServer::new(config.server, auth, host_key, interpreters, audit);
        let address = format!("{}:{}", input.address, input.port);

        let result = tokio::select! {
            served = server.serve(&address) => served.map_err(anyhow::Error::from),
            signal = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                signal.map_err(anyhow::Error::from)
            }
        };

        sweep.abort();
        audit_log.flush().await;
        result
    }
}
