//! Chat command: interactive terminal session
//!
//! A readline loop over [`ChatSession`]: plain input is sent to every
//! selected model with responses streamed to the terminal as they
//! arrive; slash commands manage the selection and the conversation
//! list. Stands in for the browser UI when talking to the same session
//! machinery.

use crate::client::{is_vision_model, OllamaClient};
use crate::config::Config;
use crate::error::Result;
use crate::session::ChatSession;
use crate::storage::{keys, FileStore, KeyValueStore, MemoryStore};

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::sync::Arc;

const HELP: &str = "\
Commands:
  /new              start a new conversation
  /list             list stored conversations
  /models           list models (selected ones marked)
  /model <name>     toggle a model in or out of the selection
  /delete <id>      delete one conversation
  /clear            delete all conversations
  /help             show this help
  /quit             exit";

/// Run the interactive chat loop
///
/// # Arguments
///
/// * `config` - Application configuration
/// * `models` - Models to add to the selection at startup
/// * `ephemeral` - Keep conversations in memory only
///
/// # Errors
///
/// Returns error if the backend or store cannot be set up, or the
/// terminal cannot be read
pub async fn run(config: &Config, models: Vec<String>, ephemeral: bool) -> Result<()> {
    let backend = OllamaClient::new(&config.upstream.url)?;

    let store: Box<dyn KeyValueStore> = if ephemeral {
        Box::new(MemoryStore::new())
    } else {
        let dir = match &config.storage.path {
            Some(path) => path.clone(),
            None => FileStore::default_dir()?,
        };
        Box::new(FileStore::open(dir)?)
    };

    let mut session = ChatSession::new(Arc::new(backend), store);
    session.refresh_models().await;
    session.set_preference(keys::BASE_URL, &config.upstream.url);

    if session.is_connected() {
        println!(
            "{} {}",
            "Connected to".green(),
            config.upstream.url.green().bold()
        );
    } else {
        println!(
            "{} {}",
            "Cannot reach".red(),
            config.upstream.url.red().bold()
        );
    }

    for model in models {
        if !session.selected_models().contains(&model) {
            session.toggle_model_selection(&model);
        }
    }

    if session.selected_models().is_empty() {
        println!("{}", "No model selected and none available; exiting.".red());
        return Ok(());
    }
    println!("Chatting with: {}", session.selected_models().join(", "));
    println!("Type /help for commands.\n");

    // The first send creates a conversation on demand; starting one here
    // would persist an empty entry even if the user quits immediately.
    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline(&"you> ".blue().bold().to_string()) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(command) = line.strip_prefix('/') {
                    if !handle_command(&mut session, command).await {
                        break;
                    }
                    continue;
                }

                stream_turn(&mut session, line).await;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    println!("{}", "Goodbye!".green());
    Ok(())
}

/// What to emit for one observed update of a model's running text
#[derive(Debug, PartialEq)]
enum Delta<'a> {
    /// Normal streaming: print the newly appended suffix
    Append(&'a str),
    /// The running text was replaced wholesale (error message)
    Replace(&'a str),
}

/// Diff the previously observed text against the current one
///
/// Fragments only ever append, so anything that is not a prefix
/// extension is a replacement. Prefix length is a char boundary by
/// construction, making the suffix slice safe.
fn next_delta<'a>(previous: &str, current: &'a str) -> Delta<'a> {
    if current.starts_with(previous) {
        Delta::Append(&current[previous.len()..])
    } else {
        Delta::Replace(current)
    }
}

/// Send one message, printing fragments as they arrive
///
/// Returns after every selected model has answered or failed.
async fn stream_turn(session: &mut ChatSession, text: &str) {
    let mut current_model: Option<String> = None;
    let mut previous = String::new();

    session
        .send_message_with(text, Vec::new(), &mut |model, acc| {
            if current_model.as_deref() != Some(model) {
                if current_model.is_some() {
                    println!();
                }
                print!("{} ", format!("{}>", model).cyan().bold());
                current_model = Some(model.to_string());
                previous.clear();
            }
            match next_delta(&previous, acc) {
                Delta::Append(suffix) => print!("{}", suffix),
                Delta::Replace(message) => print!("\n{}", message.red()),
            }
            previous = acc.to_string();
            let _ = std::io::stdout().flush();
        })
        .await;

    if current_model.is_some() {
        println!();
    }
}

/// Handle a slash command; returns false to exit the loop
async fn handle_command(session: &mut ChatSession, command: &str) -> bool {
    let (name, arg) = match command.split_once(' ') {
        Some((n, a)) => (n, a.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "exit" => return false,
        "help" => println!("{}", HELP),
        "new" => {
            let id = session.create_new_conversation().id.clone();
            println!("Started conversation {}", id.dimmed());
        }
        "list" => {
            if session.conversations().is_empty() {
                println!("No stored conversations.");
            }
            for conv in session.conversations() {
                println!(
                    "{}  {} ({} messages)",
                    conv.id.dimmed(),
                    conv.title,
                    conv.messages.len()
                );
            }
        }
        "models" => {
            session.refresh_models().await;
            for model in session.models() {
                let marker = if session.selected_models().contains(&model.name) {
                    "*".green().to_string()
                } else {
                    " ".to_string()
                };
                let vision = if is_vision_model(&model.name) {
                    " (vision)".dimmed().to_string()
                } else {
                    String::new()
                };
                println!("{} {}{}", marker, model.name, vision);
            }
        }
        "model" => {
            if arg.is_empty() {
                println!("Usage: /model <name>");
            } else {
                session.toggle_model_selection(arg);
                println!("Selection: {}", session.selected_models().join(", "));
            }
        }
        "delete" => {
            if arg.is_empty() {
                println!("Usage: /delete <id>");
            } else {
                session.delete_conversation(arg);
                println!("Deleted {}", arg.dimmed());
            }
        }
        "clear" => {
            session.clear_all_conversations();
            println!("All conversations deleted.");
        }
        _ => println!("Unknown command: /{}. Type /help.", name),
    }

    true
}
