// Terminal front end for the interview: the same session flow as the web UI,
// driven by lines on stdin.

use anyhow::{bail, Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::config::Config;
use crate::gateway::{CompletionGateway, OpenAiGateway};
use crate::history::{HistoryStore, Message, Role};
use crate::prompts::API_KEY_MISSING_MESSAGE;
use crate::session::SessionController;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatCommand {
    Answer(String),
    Summary,
    New,
    History,
    Open(String),
    Help,
    Quit,
}

impl ChatCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match head {
            "/summary" => ChatCommand::Summary,
            "/new" => ChatCommand::New,
            "/history" => ChatCommand::History,
            "/open" if !rest.is_empty() => ChatCommand::Open(rest.to_string()),
            "/help" => ChatCommand::Help,
            "/quit" | "/exit" => ChatCommand::Quit,
            _ => ChatCommand::Answer(line.to_string()),
        }
    }
}

const HELP: &str = "Commands: /summary, /new, /history, /open <file>, /help, /quit. Anything else is your answer.";

fn print_message(out: &mut impl Write, message: &Message) -> std::io::Result<()> {
    let speaker = match message.role {
        Role::Assistant => "Interviewer",
        Role::User => "You",
        Role::System => "System",
    };
    writeln!(out, "{}: {}\n", speaker, message.content)
}

fn print_transcript(out: &mut impl Write, session: &SessionController) -> std::io::Result<()> {
    for message in session.transcript() {
        print_message(out, message)?;
    }
    Ok(())
}

/// Runs the interview on stdin/stdout until `/quit` or end of input.
pub async fn run_terminal_chat(config: &Config, history: HistoryStore, resume: Option<String>) -> Result<()> {
    if !config.has_api_key() {
        bail!(API_KEY_MISSING_MESSAGE);
    }
    let gateway = OpenAiGateway::new(config).context("Failed to create API client")?;
    let mut session = SessionController::new(history);
    if let Some(file) = resume {
        if !session.open(&file)? {
            bail!("No such session: {}", file);
        }
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    run_chat_loop(&mut session, &gateway, stdin, &mut stdout).await
}

pub async fn run_chat_loop<R, W>(
    session: &mut SessionController,
    gateway: &dyn CompletionGateway,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    session.start().context("Failed to save new session")?;
    print_transcript(out, session)?;
    writeln!(out, "{}\n", HELP)?;

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ChatCommand::parse(&line) {
            ChatCommand::Answer(text) => {
                if text.is_empty() {
                    continue;
                }
                write!(out, "\nInterviewer: ")?;
                let mut streamed = String::new();
                let reply = session
                    .submit(&text, gateway, |fragment| {
                        streamed.push_str(fragment);
                        let _ = write!(out, "{}", fragment);
                        let _ = out.flush();
                    })
                    .await
                    .context("Failed to save session")?;
                // On failure the reply is the error text, not what was streamed.
                if let Some(reply) = reply.filter(|r| *r != streamed) {
                    if !streamed.is_empty() {
                        writeln!(out)?;
                    }
                    write!(out, "{}", reply)?;
                }
                writeln!(out, "\n")?;
            }
            ChatCommand::Summary => {
                writeln!(out, "Generating the interview report...")?;
                let summary = session.summarize(gateway).await;
                writeln!(out, "\n{}\n", summary)?;
            }
            ChatCommand::New => {
                session.reset();
                session.start().context("Failed to save new session")?;
                print_transcript(out, session)?;
            }
            ChatCommand::History => {
                let entries = session.history().summaries()?;
                if entries.is_empty() {
                    writeln!(out, "No saved sessions.")?;
                }
                for entry in entries {
                    let marker = if session.current_file() == Some(entry.file.as_str()) { "*" } else { " " };
                    writeln!(out, "{} {}  {}", marker, entry.file, entry.title)?;
                }
            }
            ChatCommand::Open(file) => {
                if session.open(&file)? {
                    print_transcript(out, session)?;
                } else {
                    writeln!(out, "No such session: {}", file)?;
                }
            }
            ChatCommand::Help => writeln!(out, "{}", HELP)?,
            ChatCommand::Quit => break,
        }
    }

    info!(file = ?session.current_file(), "Chat session finished");
    Ok(())
}
