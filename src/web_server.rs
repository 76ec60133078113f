use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigStore};
use crate::constants::MODEL_CHOICES;
use crate::error::{GatewayError, StoreError};
use crate::gateway::{CompletionGateway, OpenAiGateway};
use crate::history::{HistoryEntry, HistoryStore, Message, SessionRecord};
use crate::prompts::API_KEY_MISSING_MESSAGE;
use crate::session::SessionController;

/// Builds a gateway from the config in effect when a request is made, so
/// saving new settings applies to the next turn.
pub type GatewayFactory =
    Arc<dyn Fn(&Config) -> Result<Arc<dyn CompletionGateway>, GatewayError> + Send + Sync>;

pub fn openai_gateway_factory() -> GatewayFactory {
    Arc::new(|config: &Config| {
        let gateway: Arc<dyn CompletionGateway> = Arc::new(OpenAiGateway::new(config)?);
        Ok(gateway)
    })
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    config_store: ConfigStore,
    config: Arc<RwLock<Config>>,
    history: HistoryStore,
    gateway_factory: GatewayFactory,
}

impl AppState {
    pub fn new(
        config_store: ConfigStore,
        history: HistoryStore,
        templates_dir: &str,
        gateway_factory: GatewayFactory,
    ) -> Result<Self> {
        let config = config_store
            .load()
            .with_context(|| format!("Failed to load config from {}", config_store.path().display()))?;
        let templates = create_minijinja_env(templates_dir);
        Ok(Self {
            templates: Arc::new(templates),
            config_store,
            config: Arc::new(RwLock::new(config)),
            history,
            gateway_factory,
        })
    }

    async fn gateway(&self) -> Result<Arc<dyn CompletionGateway>, GatewayError> {
        let config = self.config.read().await;
        (self.gateway_factory)(&config)
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: &str) -> AutoReloader {
    let templates_dir = templates_dir.to_string();
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

/// Messages the page sends over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Start,
    UserMessage { content: String },
    NewSession,
    LoadSession { file: String },
    DeleteSession { file: String },
    Summarize,
}

/// Messages pushed to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Transcript {
        messages: Vec<Message>,
        current_file: Option<String>,
    },
    Fragment { text: String },
    ReplyDone { content: String },
    Summary { content: String },
    HistoryChanged,
    Error { message: String },
}

struct ApiError(StatusCode, String);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, "Store operation failed");
        }
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, Html<String>> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "Java Interview Assistant",
                    models => MODEL_CHOICES,
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            Html(format!("Internal Server Error: {}", e))
        })
}

async fn get_config(State(state): State<AppState>) -> Json<Config> {
    Json(state.config.read().await.masked())
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

async fn put_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<Config>, ApiError> {
    let mut config = state.config.write().await;
    let mut next = Config {
        api_key: config.api_key.clone(),
        base_url: update.base_url,
        model: update.model,
    };
    // A blank key field means "keep the stored key".
    if let Some(key) = update.api_key.filter(|k| !k.trim().is_empty()) {
        next.api_key = key;
    }
    state.config_store.save(&next)?;
    *config = next;
    Ok(Json(config.masked()))
}

async fn get_models() -> Json<&'static [&'static str]> {
    Json(MODEL_CHOICES)
}

async fn list_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    Ok(Json(state.history.summaries()?))
}

async fn get_history(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    match state.history.load(&file)? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError(StatusCode::NOT_FOUND, format!("no such session: {}", file))),
    }
}

async fn delete_history(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.history.delete(&file)?;
    Ok(StatusCode::NO_CONTENT)
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Each connection is one browser tab with its own interview session.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server event: {}", e);
                    continue;
                }
            };
            if sender.send(WsMessage::Text(json)).await.is_err() {
                warn!("WebSocket client disconnected or send error. Closing connection.");
                break;
            }
        }
    });

    let mut session = SessionController::new(state.history.clone());
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Ignoring unparseable client message: {}", e);
                        let _ = tx.send(ServerEvent::Error {
                            message: format!("invalid message: {}", e),
                        });
                        continue;
                    }
                };
                debug!(?event, "Client event");
                if let Err(e) = handle_client_event(&state, &mut session, event, &tx).await {
                    error!("Failed to handle client event: {:?}", e);
                    let _ = tx.send(ServerEvent::Error { message: e.to_string() });
                }
            }
            WsMessage::Binary(_) => warn!("Received unexpected binary message from client"),
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Close(_) => {
                info!("Client requested WebSocket close");
                break;
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    info!("WebSocket connection closed");
}

fn send_transcript(session: &SessionController, tx: &mpsc::UnboundedSender<ServerEvent>) {
    let _ = tx.send(ServerEvent::Transcript {
        messages: session.transcript().to_vec(),
        current_file: session.current_file().map(str::to_string),
    });
}

/// Greets a fresh session once an API key is configured.
async fn start_session(
    state: &AppState,
    session: &mut SessionController,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<()> {
    if session.transcript().is_empty() && !state.config.read().await.has_api_key() {
        let _ = tx.send(ServerEvent::Error {
            message: API_KEY_MISSING_MESSAGE.to_string(),
        });
        send_transcript(session, tx);
        return Ok(());
    }
    let created = session.start().context("Failed to save new session")?;
    send_transcript(session, tx);
    if created {
        let _ = tx.send(ServerEvent::HistoryChanged);
    }
    Ok(())
}

/// Applies one client action to `session`, reporting results on `tx`.
pub async fn handle_client_event(
    state: &AppState,
    session: &mut SessionController,
    event: ClientEvent,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) -> Result<()> {
    match event {
        ClientEvent::Start => start_session(state, session, tx).await?,
        ClientEvent::NewSession => {
            session.reset();
            start_session(state, session, tx).await?;
        }
        ClientEvent::UserMessage { content } => {
            if !state.config.read().await.has_api_key() {
                let _ = tx.send(ServerEvent::Error {
                    message: API_KEY_MISSING_MESSAGE.to_string(),
                });
                return Ok(());
            }
            let had_file = session.current_file().is_some();
            let gateway = state.gateway().await.context("Failed to create API client")?;
            let fragments = tx.clone();
            let reply = session
                .submit(&content, gateway.as_ref(), move |text| {
                    let _ = fragments.send(ServerEvent::Fragment { text: text.to_string() });
                })
                .await
                .context("Failed to save session")?;
            if let Some(content) = reply {
                let _ = tx.send(ServerEvent::ReplyDone { content });
                if !had_file {
                    let _ = tx.send(ServerEvent::HistoryChanged);
                }
            }
        }
        ClientEvent::LoadSession { file } => {
            if !session.open(&file).context("Failed to load session")? {
                return Err(anyhow!("no such session: {}", file));
            }
            send_transcript(session, tx);
        }
        ClientEvent::DeleteSession { file } => {
            session.delete(&file).context("Failed to delete session")?;
            let _ = tx.send(ServerEvent::HistoryChanged);
            if session.transcript().is_empty() {
                start_session(state, session, tx).await?;
            }
        }
        ClientEvent::Summarize => {
            let gateway = state.gateway().await.context("Failed to create API client")?;
            let content = session.summarize(gateway.as_ref()).await.to_string();
            let _ = tx.send(ServerEvent::Summary { content });
        }
    }
    Ok(())
}

pub fn build_router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/models", get(get_models))
        .route("/api/history", get(list_history))
        .route("/api/history/:file", get(get_history).delete(delete_history))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(addr: SocketAddr, state: AppState, static_dir: &str) -> Result<()> {
    let app = build_router(state, static_dir);
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{API_ERROR_MESSAGE, WELCOME_MESSAGE};
    use crate::test_utils::{ScriptedGateway, ScriptedReply};
    use tempfile::TempDir;

    fn state_with(dir: &TempDir, api_key: &str, gateway: ScriptedGateway) -> AppState {
        let config_store = ConfigStore::new(dir.path().join("config.json"));
        config_store
            .save(&Config {
                api_key: api_key.to_string(),
                ..Config::default()
            })
            .unwrap();
        let factory: GatewayFactory = Arc::new(move |_: &Config| {
            let gateway: Arc<dyn CompletionGateway> = Arc::new(gateway.clone());
            Ok(gateway)
        });
        AppState::new(
            config_store,
            HistoryStore::new(dir.path().join("history")),
            concat!(env!("CARGO_MANIFEST_DIR"), "/templates"),
            factory,
        )
        .unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_client_event_wire_format() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"user_message","content":"hi"}"#).unwrap();
        assert_eq!(event, ClientEvent::UserMessage { content: "hi".into() });
        let event: ClientEvent = serde_json::from_str(r#"{"type":"summarize"}"#).unwrap();
        assert_eq!(event, ClientEvent::Summarize);
    }

    #[test]
    fn test_server_event_wire_format() {
        let json = serde_json::to_value(ServerEvent::Fragment { text: "Hel".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "fragment", "text": "Hel"}));
        let json = serde_json::to_value(ServerEvent::HistoryChanged).unwrap();
        assert_eq!(json, serde_json::json!({"type": "history_changed"}));
    }

    #[tokio::test]
    async fn test_start_without_api_key_reports_error() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&dir, "", ScriptedGateway::default());
        let mut session = SessionController::new(state.history.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_client_event(&state, &mut session, ClientEvent::Start, &tx).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            ServerEvent::Error { message: API_KEY_MISSING_MESSAGE.to_string() }
        );
        assert!(session.transcript().is_empty());
        assert!(state.history.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_then_message_streams_fragments() {
        let dir = TempDir::new().unwrap();
        let gateway = ScriptedGateway::new(vec![ScriptedReply::text(&["Hel", "lo"])]);
        let state = state_with(&dir, "sk-test", gateway);
        let mut session = SessionController::new(state.history.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_client_event(&state, &mut session, ClientEvent::Start, &tx).await.unwrap();
        let events = drain(&mut rx);
        match &events[0] {
            ServerEvent::Transcript { messages, current_file } => {
                assert_eq!(messages, &vec![Message::assistant(WELCOME_MESSAGE)]);
                assert!(current_file.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(events[1], ServerEvent::HistoryChanged);

        handle_client_event(
            &state,
            &mut session,
            ClientEvent::UserMessage { content: "I use Java 17".into() },
            &tx,
        )
        .await
        .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![
                ServerEvent::Fragment { text: "Hel".into() },
                ServerEvent::Fragment { text: "lo".into() },
                ServerEvent::ReplyDone { content: "Hello".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_turn_reports_error_text_as_reply() {
        let dir = TempDir::new().unwrap();
        let gateway = ScriptedGateway::new(vec![ScriptedReply::Reject]);
        let state = state_with(&dir, "sk-test", gateway);
        let mut session = SessionController::new(state.history.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_client_event(&state, &mut session, ClientEvent::Start, &tx).await.unwrap();
        drain(&mut rx);
        handle_client_event(
            &state,
            &mut session,
            ClientEvent::UserMessage { content: "answer".into() },
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::ReplyDone { content: API_ERROR_MESSAGE.into() }]
        );
    }

    #[tokio::test]
    async fn test_delete_current_session_starts_a_new_one() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&dir, "sk-test", ScriptedGateway::default());
        let mut session = SessionController::new(state.history.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_client_event(&state, &mut session, ClientEvent::Start, &tx).await.unwrap();
        let first = session.current_file().unwrap().to_string();
        drain(&mut rx);

        handle_client_event(&state, &mut session, ClientEvent::DeleteSession { file: first.clone() }, &tx)
            .await
            .unwrap();

        let files = state.history.list().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.current_file(), Some(files[0].as_str()));
        assert_eq!(drain(&mut rx)[0], ServerEvent::HistoryChanged);
    }

    #[tokio::test]
    async fn test_reconnect_continues_loaded_session() {
        let dir = TempDir::new().unwrap();
        let gateway = ScriptedGateway::new(vec![ScriptedReply::text(&["Next question"])]);
        let state = state_with(&dir, "sk-test", gateway);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut first = SessionController::new(state.history.clone());
        handle_client_event(&state, &mut first, ClientEvent::Start, &tx).await.unwrap();
        let file = first.current_file().unwrap().to_string();
        drop(first);
        drain(&mut rx);

        // A new connection gets a fresh controller.
        let mut second = SessionController::new(state.history.clone());
        handle_client_event(&state, &mut second, ClientEvent::LoadSession { file: file.clone() }, &tx)
            .await
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::Transcript {
                messages: vec![Message::assistant(WELCOME_MESSAGE)],
                current_file: Some(file.clone()),
            }]
        );

        handle_client_event(
            &state,
            &mut second,
            ClientEvent::UserMessage { content: "Five years of Spring".into() },
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(state.history.list().unwrap(), vec![file.clone()]);
        let stored = state.history.load(&file).unwrap().unwrap();
        assert_eq!(
            stored.messages,
            vec![
                Message::assistant(WELCOME_MESSAGE),
                Message::user("Five years of Spring"),
                Message::assistant("Next question"),
            ]
        );
        assert!(!drain(&mut rx).contains(&ServerEvent::HistoryChanged));
    }

    #[tokio::test]
    async fn test_load_missing_session_is_an_error() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&dir, "sk-test", ScriptedGateway::default());
        let mut session = SessionController::new(state.history.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = handle_client_event(
            &state,
            &mut session,
            ClientEvent::LoadSession { file: "20000101_000000_00000000.json".into() },
            &tx,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no such session"));
    }

    #[tokio::test]
    async fn test_summarize_sends_summary() {
        let dir = TempDir::new().unwrap();
        let gateway = ScriptedGateway::new(vec![ScriptedReply::text(&["Score ", "80"])]);
        let state = state_with(&dir, "sk-test", gateway.clone());
        let mut session = SessionController::new(state.history.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_client_event(&state, &mut session, ClientEvent::Summarize, &tx).await.unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::Summary { content: "Score 80".into() }]
        );
        assert_eq!(gateway.calls()[0].kind, crate::prompts::PromptKind::Summary);
    }
}
