// Defaults that can be overridden from the environment (or a .env file).

use std::env;

lazy_static::lazy_static! {
    pub static ref CONFIG_FILE: String = env::var("INTERVIEWER_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    pub static ref HISTORY_DIR: String = env::var("INTERVIEWER_HISTORY_DIR").unwrap_or_else(|_| "history".to_string());
    pub static ref TEMPLATES_DIR: String = env::var("INTERVIEWER_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("INTERVIEWER_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Models offered in the UI. The config itself accepts any model name.
pub const MODEL_CHOICES: &[&str] = &["deepseek-chat", "gpt-3.5-turbo", "gpt-4"];

pub const DEFAULT_PORT: u16 = 8501;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
