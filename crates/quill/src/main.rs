//! An interactive terminal front end for the chat client.

#[macro_use]
extern crate tracing;

mod sources;

use std::env;
use std::io::Write as _;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use quill_backend::{ChatMessage, Granularity, SourceProvider as _};
use quill_core::{ChatClient, ClientBuilder, ClientSnapshot, ConversationId, StreamState};
use quill_http_backend::{HttpBackend, HttpConfigBuilder};
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use crate::sources::DirSourceProvider;

const BAR_CHAR: &str = "▎";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that \
                                     answers questions about the provided \
                                     documents.";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(api_url) = env::var("QUILL_API_URL") else {
        eprintln!("QUILL_API_URL environment variable is not set");
        return;
    };
    let system_prompt = env::var("QUILL_SYSTEM_PROMPT")
        .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_owned());
    let source_dir =
        env::var("QUILL_SOURCE_DIR").unwrap_or_else(|_| "sources".to_owned());

    let config = HttpConfigBuilder::with_api_url(api_url).build();
    let backend = HttpBackend::new(config);
    let provider = DirSourceProvider::new(source_dir);

    // List the source directory up front so `/sources` has something
    // to show before the first background refresh lands.
    let initial_sources = match provider.list_source_names().await {
        Ok(names) => names,
        Err(err) => {
            warn!("failed to list sources: {err}");
            Vec::new()
        }
    };

    let client = ClientBuilder::with_backends(backend.clone(), backend, provider)
        .with_system_prompt(system_prompt)
        .with_initial_sources(initial_sources)
        .build();
    let mut rx = client.subscribe();

    client.new_conversation();
    settle(&mut rx).await;

    println!("Type a message to chat, or /help for commands.");

    loop {
        let label = {
            let snapshot = rx.borrow();
            snapshot
                .active_conversation()
                .map(|c| c.name().to_owned())
                .unwrap_or_else(|| "(none)".to_owned())
        };
        print!("{} > ", label.bright_black());
        std::io::stdout().flush().unwrap();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !run_command(&client, &mut rx, command).await {
                break;
            }
            continue;
        }

        let Some((id, baseline)) = rx
            .borrow()
            .active_conversation()
            .map(|c| (c.id(), c.messages().len()))
        else {
            eprintln!("no active conversation, use /new");
            continue;
        };
        client.send_message(id, line);
        stream_turn(&mut rx, id, baseline).await;
    }
}

/// Runs a slash command. Returns `false` when the program should exit.
async fn run_command(
    client: &ChatClient,
    rx: &mut watch::Receiver<ClientSnapshot>,
    input: &str,
) -> bool {
    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or("");
    match command {
        "quit" | "q" => return false,
        "help" => print_help(),
        "new" => {
            client.new_conversation();
            settle(rx).await;
        }
        "list" => print_conversations(&rx.borrow()),
        "switch" => {
            let Some(id) = parse_id(parts.next()) else {
                eprintln!("usage: /switch <id>");
                return true;
            };
            client.select_conversation(id);
            settle(rx).await;
        }
        "rename" => {
            let name = parts.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                eprintln!("usage: /rename <name>");
                return true;
            }
            let Some(id) = active_id(rx) else {
                eprintln!("no active conversation");
                return true;
            };
            client.rename_conversation(id, name);
            settle(rx).await;
        }
        "remove" => {
            let Some(id) = parse_id(parts.next()) else {
                eprintln!("usage: /remove <id>");
                return true;
            };
            client.remove_conversation(id);
            settle(rx).await;
        }
        "clear" => {
            let Some(id) = active_id(rx) else {
                eprintln!("no active conversation");
                return true;
            };
            client.clear_conversation(id);
            settle(rx).await;
        }
        "sources" => {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.sources().is_empty() {
                println!("no sources available");
            }
            for name in snapshot.sources() {
                println!("{name}");
            }
        }
        "source" => {
            let Some(name) = parts.next() else {
                eprintln!("usage: /source <name> [summary|full]");
                return true;
            };
            let granularity = match parts.next() {
                None | Some("summary") => Granularity::Summary,
                Some("full") => Granularity::Full,
                Some(other) => {
                    eprintln!("unknown granularity: {other}");
                    return true;
                }
            };
            let Some(id) = active_id(rx) else {
                eprintln!("no active conversation");
                return true;
            };
            client.set_data_source(id, name, granularity);
            await_ingest(rx, id, name).await;
        }
        _ => eprintln!("unknown command: /{command}"),
    }
    true
}

fn print_help() {
    println!("/new                       start a new conversation");
    println!("/list                      list conversations");
    println!("/switch <id>               switch to a conversation");
    println!("/rename <name>             rename the active conversation");
    println!("/remove <id>               remove a conversation");
    println!("/clear                     clear the active conversation");
    println!("/sources                   list available data sources");
    println!("/source <name> [summary|full]  attach a data source");
    println!("/quit                      exit");
}

fn print_conversations(snapshot: &ClientSnapshot) {
    for conversation in snapshot.conversations() {
        let marker = if snapshot.active_id() == Some(conversation.id()) {
            "*"
        } else {
            " "
        };
        let source = match conversation.data_source() {
            Some(source) => {
                format!(" [{source}, {}]", conversation.granularity())
            }
            None => String::new(),
        };
        println!(
            "{marker} {} {}{source}",
            conversation.id().to_string().bright_black(),
            conversation.name()
        );
    }
}

fn parse_id(arg: Option<&str>) -> Option<ConversationId> {
    arg?.parse().ok().map(ConversationId)
}

fn active_id(rx: &watch::Receiver<ClientSnapshot>) -> Option<ConversationId> {
    rx.borrow().active_conversation().map(|c| c.id())
}

/// Waits briefly for the next snapshot, so the prompt reflects the
/// command that was just issued.
async fn settle(rx: &mut watch::Receiver<ClientSnapshot>) {
    let _ = timeout(Duration::from_millis(200), rx.changed()).await;
    rx.borrow_and_update();
}

fn spinner(message: &'static str) -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style);
    progress_bar.set_message(message);
    progress_bar
}

/// Follows one response stream, printing deltas as they fold into the
/// trailing assistant message.
async fn stream_turn(
    rx: &mut watch::Receiver<ClientSnapshot>,
    id: ConversationId,
    baseline: usize,
) {
    let mut progress_bar: Option<ProgressBar> = None;
    let mut printed = 0;

    loop {
        let (state, message_count, text) = {
            let snapshot = rx.borrow_and_update();
            let messages = snapshot
                .conversation(id)
                .map(|c| c.messages())
                .unwrap_or_default();
            let text = messages
                .last()
                .and_then(|message| match message {
                    ChatMessage::Assistant(text) => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            (snapshot.stream_state(id), messages.len(), text)
        };

        // The turn is over once the user message is in and the stream
        // slot is gone. A completed stream may have delivered no deltas
        // at all, so the assistant message is not required; snapshots
        // also coalesce, so intermediate states may never be observed.
        let finished =
            message_count > baseline && state == StreamState::Idle;

        match state {
            StreamState::Idle if !finished => {}
            StreamState::Awaiting => {
                progress_bar
                    .get_or_insert_with(|| spinner("Thinking..."))
                    .inc(1);
            }
            StreamState::Streaming => {
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                print_suffix(&text, &mut printed);
            }
            StreamState::Idle => {
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                print_suffix(&text, &mut printed);
                if printed > 0 {
                    println!();
                }
                return;
            }
            StreamState::Failed(message) => {
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                eprintln!("{}", format!("request failed: {message}").red());
                return;
            }
        }

        let sleep = sleep(Duration::from_millis(100));
        select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = sleep => {}
        }
    }
}

fn print_suffix(text: &str, printed: &mut usize) {
    if text.len() <= *printed {
        return;
    }
    if *printed == 0 {
        print!("{}", BAR_CHAR.bright_cyan());
    }
    print!("{}", (&text[*printed..]).bright_white());
    *printed = text.len();
    std::io::stdout().flush().unwrap();
}

/// Waits for an ingestion kicked off by `/source` to finish.
async fn await_ingest(
    rx: &mut watch::Receiver<ClientSnapshot>,
    id: ConversationId,
    name: &str,
) {
    let progress_bar = spinner("Ingesting...");
    let wait = async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                let selected = snapshot
                    .conversation(id)
                    .is_some_and(|c| c.data_source() == Some(name));
                if selected && !snapshot.loading_ingest() {
                    break;
                }
            }

            let sleep = sleep(Duration::from_millis(100));
            select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = sleep => {
                    progress_bar.inc(1);
                }
            }
        }
        true
    };
    let attached = timeout(Duration::from_secs(30), wait)
        .await
        .unwrap_or(false);
    progress_bar.finish_and_clear();

    if attached {
        println!("attached source {}", name.bright_white());
    } else {
        eprintln!("source {name} was not attached");
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
