//! Integration tests for the conversation engine.
//!
//! These tests verify that:
//! - a first contact seeds contract and exemplar, and persists them
//! - simultaneous first contacts for one identity persist a single contract
//! - every turn re-sends the contract right before the command
//! - cleaned replies are what gets returned and stored
//! - blank or failed replies leave the transcript untouched
//! - a broken store degrades to in-memory history
//! - an OpenAI-compatible backend serves the `ls` first command end to end
//! - the factory opens engines and refuses a keyless credentialed provider

use async_trait::async_trait;
use mirage_config::{LlmConfig, ProviderKind};
use mirage_conversation::{
    ConversationEngine, ConversationError, ConversationFactory, EngineSettings, default_prompt,
    exemplar,
};
use mirage_core::{
    ChatMessage, CommandInterpreter, HistoryStore, InterpreterFactory, LLMProvider, LLMResponse,
    Role,
};
use mirage_history::{DEFAULT_TTL, SqliteHistoryStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Replays canned replies and records every request it receives.
#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<VecDeque<anyhow::Result<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    fn new(replies: impl IntoIterator<Item = anyhow::Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::default(),
        })
    }

    fn silent() -> Arc<Self> {
        Self::new(Vec::<anyhow::Result<String>>::new())
    }

    fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LLMResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))?;
        Ok(LLMResponse {
            content: reply,
            usage: None,
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

struct BrokenStore;

#[async_trait]
impl HistoryStore for BrokenStore {
    async fn load(&self, _identity: &str) -> anyhow::Result<Vec<ChatMessage>> {
        anyhow::bail!("disk on fire")
    }

    async fn append(&self, _identity: &str, _messages: &[ChatMessage]) -> anyhow::Result<()> {
        anyhow::bail!("disk on fire")
    }

    async fn seed_if_absent(
        &self,
        _identity: &str,
        _seed: &[ChatMessage],
    ) -> anyhow::Result<Vec<ChatMessage>> {
        anyhow::bail!("disk on fire")
    }

    async fn cleanup(&self) -> anyhow::Result<u64> {
        anyhow::bail!("disk on fire")
    }
}

async fn memory_store() -> Arc<SqliteHistoryStore> {
    Arc::new(
        SqliteHistoryStore::in_memory(DEFAULT_TTL)
            .await
            .unwrap_or_else(|e| panic!("failed to open store: {e}")),
    )
}

#[tokio::test]
async fn test_first_contact_seeds_and_persists_contract() {
    let store = memory_store().await;
    let provider = ScriptedProvider::silent();

    let engine = ConversationEngine::new(
        provider,
        store.clone(),
        EngineSettings::new("root", "10.0.0.5"),
    )
    .await;

    let stored = store.load("root").await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0], ChatMessage::system(engine.system_prompt()));
    assert_eq!(stored[1..], exemplar("root", "10.0.0.5"));
    assert_eq!(engine.session().messages(), stored.as_slice());
    assert_eq!(engine.current_prompt(), "root@10.0.0.5:~$ ");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_first_logins_seed_once() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let store = Arc::new(
        SqliteHistoryStore::open(&dir.path().join("history.db"), DEFAULT_TTL)
            .await
            .unwrap_or_else(|e| panic!("failed to open store: {e}")),
    );

    let logins: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let engine = ConversationEngine::new(
                    ScriptedProvider::silent(),
                    store,
                    EngineSettings::new("root", "10.0.0.5"),
                )
                .await;
                engine.session().message_count()
            })
        })
        .collect();
    for login in logins {
        let count = login.await.unwrap_or_else(|e| panic!("join: {e}"));
        assert_eq!(count, 3);
    }

    let stored = store.load("root").await.unwrap_or_else(|e| panic!("{e}"));
    let systems = stored.iter().filter(|m| m.role == Role::System).count();
    assert_eq!(stored.len(), 3);
    assert_eq!(systems, 1);
    assert_eq!(stored[0].role, Role::System);
}

#[tokio::test]
async fn test_turn_reasserts_contract_and_persists_pair() {
    let store = memory_store().await;
    let provider = ScriptedProvider::new([
        Ok("```bash\n/root\r\nroot@h:~$ \n```".to_string()),
        Ok("\r\nroot@h:/tmp$ ".to_string()),
    ]);
    let mut engine = ConversationEngine::new(
        provider.clone(),
        store.clone(),
        EngineSettings::new("root", "h"),
    )
    .await;

    let first = engine.execute("pwd").await.unwrap_or_else(|e| panic!("{e}"));
    let second = engine.execute("cd /tmp").await.unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(first, "/root\r\nroot@h:~$ ");
    assert_eq!(second, "root@h:/tmp$ ");
    assert_eq!(engine.current_prompt(), "root@h:/tmp$ ");

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    for (request, command) in requests.iter().zip(["pwd", "cd /tmp"]) {
        let n = request.len();
        assert_eq!(request[n - 2], ChatMessage::system(engine.system_prompt()));
        assert_eq!(request[n - 1], ChatMessage::user(command));
    }
    // Second request carries the first exchange but not the first refresh.
    assert_eq!(requests[1].len(), 3 + 2 + 2);
    assert_eq!(requests[1][4], ChatMessage::assistant(first.clone()));

    let stored = store.load("root").await.unwrap_or_else(|e| panic!("{e}"));
    let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
        ]
    );
    assert_eq!(stored[4].content, first);
}

#[tokio::test]
async fn test_reconnect_resumes_stored_transcript() {
    let store = memory_store().await;
    let provider = ScriptedProvider::new([Ok("notes.txt\r\nadmin@h:~$ ".to_string())]);
    {
        let mut engine = ConversationEngine::new(
            provider.clone(),
            store.clone(),
            EngineSettings::new("admin", "h"),
        )
        .await;
        engine.execute("touch notes.txt; ls").await.unwrap_or_else(|e| panic!("{e}"));
    }

    let resumed = ConversationEngine::new(
        ScriptedProvider::silent(),
        store.clone(),
        EngineSettings::new("admin", "h"),
    )
    .await;

    assert_eq!(resumed.session().message_count(), 5);
    let stored = store.load("admin").await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(stored.len(), 5, "reconnect must not seed a second contract");
}

#[tokio::test]
async fn test_blank_reply_is_an_error_and_not_recorded() {
    let store = memory_store().await;
    let provider = ScriptedProvider::new([Ok("```\n```".to_string())]);
    let mut engine =
        ConversationEngine::new(provider, store.clone(), EngineSettings::new("u", "h")).await;

    let result = engine.execute("whoami").await;

    assert!(matches!(result, Err(ConversationError::EmptyResponse)));
    assert_eq!(engine.session().message_count(), 3);
    assert_eq!(store.load("u").await.map(|m| m.len()).ok(), Some(3));
}

#[tokio::test]
async fn test_provider_failure_surfaces_and_session_continues() {
    let store = memory_store().await;
    let provider = ScriptedProvider::new([
        Err(anyhow::anyhow!("upstream 503")),
        Ok("u\r\nu@h:~$ ".to_string()),
    ]);
    let mut engine =
        ConversationEngine::new(provider, store, EngineSettings::new("u", "h")).await;

    let failed = engine.interpret("whoami").await;
    let recovered = engine.interpret("whoami").await;

    assert!(failed.is_err());
    assert_eq!(recovered.ok().as_deref(), Some("u\r\nu@h:~$ "));
}

#[tokio::test]
async fn test_broken_store_falls_back_to_memory() {
    let provider = ScriptedProvider::new([
        Ok("a\r\nx@h:~$ ".to_string()),
        Ok("b\r\nx@h:~$ ".to_string()),
    ]);
    let mut engine = ConversationEngine::new(
        provider.clone(),
        Arc::new(BrokenStore),
        EngineSettings::new("x", "h"),
    )
    .await;

    engine.execute("one").await.unwrap_or_else(|e| panic!("{e}"));
    engine.execute("two").await.unwrap_or_else(|e| panic!("{e}"));

    let requests = provider.requests();
    assert_eq!(requests[1][0].role, Role::System);
    assert!(requests[1].contains(&ChatMessage::user("one")));
    assert_eq!(engine.session().message_count(), 7);
}

#[tokio::test]
async fn test_custom_template_is_rendered() {
    let store = memory_store().await;
    let engine = ConversationEngine::new(
        ScriptedProvider::silent(),
        store,
        EngineSettings::new("pi", "10.1.1.1").with_template(Some("You are {host}; user {username}.".into())),
    )
    .await;

    assert_eq!(engine.system_prompt(), "You are 10.1.1.1; user pi.");
}

#[tokio::test]
async fn test_missing_credential_fails_before_any_request() {
    let server = MockServer::start().await;
    let mut llm = LlmConfig::new(ProviderKind::OpenAi, "gpt-4o-mini");
    llm.endpoint = Some(format!("{}/v1/chat/completions", server.uri()));

    let result = ConversationEngine::connect(
        &llm,
        reqwest::Client::new(),
        memory_store().await,
        "root",
        "h",
    )
    .await;

    assert!(matches!(result, Err(ConversationError::Configuration(_))));
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_first_ls_round_trip_over_http() {
    let server = MockServer::start().await;
    let reply = "Desktop  Documents  Downloads  Music  Pictures  Videos\r\nroot@192.0.2.10:~$ ";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": format!("```\n{reply}```")}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut llm = LlmConfig::new(ProviderKind::OpenAi, "gpt-4o-mini");
    llm.api_key = Some("sk-test".into());
    llm.endpoint = Some(format!("{}/v1/chat/completions", server.uri()));
    llm.retry_delays_ms = Vec::new();

    let mut engine = ConversationEngine::connect(
        &llm,
        reqwest::Client::new(),
        memory_store().await,
        "root",
        "192.0.2.10",
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    let output = engine.execute("ls").await.unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(output, reply);
    assert_eq!(engine.current_prompt(), default_prompt("root", "192.0.2.10"));

    let received = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = received
        .first()
        .and_then(|r| serde_json::from_slice(&r.body).ok())
        .unwrap_or_default();
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let roles: Vec<&str> = messages.iter().filter_map(|m| m["role"].as_str()).collect();
    assert_eq!(roles, ["system", "user", "assistant", "system", "user"]);
    assert_eq!(messages[4]["content"], "ls");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn test_factory_opens_engine_for_identity() {
    let store = memory_store().await;
    let mut llm = LlmConfig::new(ProviderKind::Ollama, "llama3");
    llm.endpoint = Some("http://127.0.0.1:9/api/chat".into());
    let factory = ConversationFactory::new(llm, reqwest::Client::new(), store.clone());

    let interpreter = factory
        .open("ubuntu", "172.16.0.4")
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(interpreter.prompt(), "ubuntu@172.16.0.4:~$ ");
    assert_eq!(store.load("ubuntu").await.map(|m| m.len()).ok(), Some(3));

    let keyless = ConversationFactory::new(
        LlmConfig::new(ProviderKind::DeepSeek, "deepseek-chat"),
        reqwest::Client::new(),
        store,
    );
    assert!(keyless.open("ubuntu", "172.16.0.4").await.is_err());
}
