//! One interview conversation: the in-memory transcript, its history file and
//! the last summary.

use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use crate::error::{GatewayError, StoreError};
use crate::gateway::{collect_fragments, CompletionGateway};
use crate::history::{HistoryStore, Message, SessionRecord};
use crate::prompts::{PromptKind, WELCOME_MESSAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    AwaitingUserInput,
    AwaitingCompletion,
}

pub struct SessionController {
    history: HistoryStore,
    transcript: Vec<Message>,
    current_file: Option<String>,
    title: String,
    created_at: NaiveDateTime,
    summary: Option<String>,
    state: SessionState,
}

impl SessionController {
    pub fn new(history: HistoryStore) -> Self {
        let record = SessionRecord::new(Vec::new());
        Self {
            history,
            transcript: Vec::new(),
            current_file: None,
            title: record.title,
            created_at: record.created_at,
            summary: None,
            state: SessionState::Empty,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Greets the candidate and saves the new session. Does nothing if the
    /// conversation already has messages. Returns whether a greeting was added.
    pub fn start(&mut self) -> Result<bool, StoreError> {
        if !self.transcript.is_empty() {
            return Ok(false);
        }
        self.stamp_new_session();
        self.transcript.push(Message::assistant(WELCOME_MESSAGE));
        self.persist()?;
        self.state = SessionState::AwaitingUserInput;
        info!(file = ?self.current_file, "Interview session started");
        Ok(true)
    }

    /// Runs one turn: records the answer, streams the interviewer's reply
    /// through `on_fragment`, records the reply and saves the session.
    ///
    /// A failed completion is not an error here: the fixed API error text
    /// becomes the reply. Blank input is ignored and yields `None`.
    pub async fn submit<F>(
        &mut self,
        text: &str,
        gateway: &dyn CompletionGateway,
        on_fragment: F,
    ) -> Result<Option<String>, StoreError>
    where
        F: FnMut(&str) + Send,
    {
        if text.trim().is_empty() {
            return Ok(None);
        }

        self.transcript.push(Message::user(text));
        self.state = SessionState::AwaitingCompletion;

        let reply = match request_reply(gateway, &self.transcript, PromptKind::Interview, on_fragment).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Interview turn failed");
                e.user_message().to_string()
            }
        };

        self.transcript.push(Message::assistant(reply.clone()));
        self.state = SessionState::AwaitingUserInput;
        self.persist()?;
        Ok(Some(reply))
    }

    /// Asks for an evaluation of the whole conversation. The result is kept
    /// in memory only.
    pub async fn summarize(&mut self, gateway: &dyn CompletionGateway) -> &str {
        let summary = match request_reply(gateway, &self.transcript, PromptKind::Summary, |_| {}).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Summary request failed");
                e.user_message().to_string()
            }
        };
        self.summary.insert(summary).as_str()
    }

    /// Forgets the current conversation. Whatever is saved next goes to a new
    /// file with a new title and creation time.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.current_file = None;
        self.summary = None;
        self.state = SessionState::Empty;
        self.stamp_new_session();
    }

    /// Switches to a stored session. Returns `false` if it does not exist.
    pub fn open(&mut self, file_name: &str) -> Result<bool, StoreError> {
        let Some(record) = self.history.load(file_name)? else {
            return Ok(false);
        };
        self.transcript = record.messages;
        self.title = record.title;
        self.created_at = record.created_at;
        self.current_file = Some(file_name.to_string());
        self.summary = None;
        self.state = if self.transcript.is_empty() {
            SessionState::Empty
        } else {
            SessionState::AwaitingUserInput
        };
        info!(file = %file_name, messages = self.transcript.len(), "Opened stored session");
        Ok(true)
    }

    /// Deletes a stored session, resetting if it is the one in use.
    pub fn delete(&mut self, file_name: &str) -> Result<(), StoreError> {
        self.history.delete(file_name)?;
        if self.current_file.as_deref() == Some(file_name) {
            self.reset();
        }
        Ok(())
    }

    fn stamp_new_session(&mut self) {
        let now = Local::now().naive_local();
        self.title = format!("Interview_{}", now.format("%Y-%m-%d %H:%M"));
        self.created_at = now;
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let record = SessionRecord {
            title: self.title.clone(),
            messages: self.transcript.clone(),
            created_at: self.created_at,
        };
        let file = self.history.save(&record, self.current_file.as_deref())?;
        self.current_file = Some(file);
        Ok(())
    }
}

async fn request_reply<F>(
    gateway: &dyn CompletionGateway,
    transcript: &[Message],
    kind: PromptKind,
    on_fragment: F,
) -> Result<String, GatewayError>
where
    F: FnMut(&str) + Send,
{
    let stream = gateway.stream_completion(transcript, kind).await?;
    collect_fragments(stream, on_fragment).await
}
