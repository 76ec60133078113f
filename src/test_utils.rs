use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::GatewayError;
use crate::gateway::{CompletionGateway, FragmentStream};
use crate::history::Message;
use crate::prompts::PromptKind;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Fragments(Vec<String>),
    /// The request itself fails.
    Reject,
    /// Some fragments arrive, then the stream breaks.
    BreakAfter(Vec<String>),
}

impl ScriptedReply {
    pub fn text(fragments: &[&str]) -> Self {
        ScriptedReply::Fragments(fragments.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub transcript: Vec<Message>,
    pub kind: PromptKind,
}

/// Gateway that plays back queued replies and records what it was asked.
/// Falls back to an empty reply once the queue is exhausted.
#[derive(Clone, Debug, Default)]
pub struct ScriptedGateway {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn stream_completion(
        &self,
        transcript: &[Message],
        kind: PromptKind,
    ) -> Result<FragmentStream, GatewayError> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            transcript: transcript.to_vec(),
            kind,
        });
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(ScriptedReply::Fragments(Vec::new()));

        match reply {
            ScriptedReply::Fragments(parts) => Ok(stream::iter(parts.into_iter().map(Ok)).boxed()),
            ScriptedReply::Reject => Err(GatewayError::Auth {
                status: 401,
                message: "invalid api key".to_string(),
            }),
            ScriptedReply::BreakAfter(parts) => {
                let items = parts
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(GatewayError::Network("connection reset".to_string()))));
                Ok(stream::iter(items).boxed())
            }
        }
    }
}
