pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod history;
pub mod prompts;
pub mod session;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod web_server;

pub use config::{Config, ConfigStore};
pub use error::{GatewayError, StoreError};
pub use gateway::{CompletionGateway, FragmentStream, OpenAiGateway};
pub use history::{HistoryStore, Message, Role, SessionRecord};
pub use prompts::PromptKind;
pub use session::{SessionController, SessionState};
