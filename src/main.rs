//! Parley CLI binary entry point.

use std::sync::Arc;

use parley::agent::{AgentBuilder, AgentShape, Session};
use parley::cli::{ChatArgs, Cli, Commands, HistoryArgs};
use parley::config::{default_session_db, ParleyConfig};
use parley::error::ParleyError;
use parley::session::{SessionStore, SqliteSessionStore, IN_MEMORY};
use parley::turn::{TurnEvent, TurnEventPayload};
use parley::types::Role;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let result = match ParleyConfig::load(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Chat(args) => handle_chat(config, args).await,
            Commands::History(args) => handle_history(config, args).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// A named session only makes sense on disk; fall back to the user data dir.
fn durable_db(config: &mut ParleyConfig, explicit: Option<&String>) {
    if explicit.is_none() && config.session_db == IN_MEMORY {
        config.session_db = default_session_db().display().to_string();
    }
}

async fn handle_chat(mut config: ParleyConfig, args: ChatArgs) -> Result<(), ParleyError> {
    args.apply(&mut config);
    let shape = args.shape();
    if shape == AgentShape::WithMemory {
        durable_db(&mut config, args.db.as_ref());
    }

    let agent = AgentBuilder::from_config(&config, shape)?
        .with_event_sink(Arc::new(print_tool_activity))
        .build();
    let mut session = match &args.session {
        Some(id) => agent.open_session(id).await?,
        None => agent.new_session(),
    };
    tracing::info!(session = session.id(), %shape, "starting chat");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    parley::repl::run_repl(&agent, &mut session, stdin, tokio::io::stdout()).await
}

async fn handle_history(mut config: ParleyConfig, args: HistoryArgs) -> Result<(), ParleyError> {
    if let Some(db) = &args.db {
        config.session_db = db.clone();
    }
    durable_db(&mut config, args.db.as_ref());

    let store = SqliteSessionStore::open(&config.session_db)?;
    let session = Session::with_history(&args.session, store.load(&args.session).await?);
    let snapshot = session.snapshot();

    println!("Session: {}", snapshot.session_id);
    println!("Messages: {}", snapshot.message_count);
    match snapshot.next {
        Some(state) => println!("Next: {state}"),
        None => println!("Next: (idle)"),
    }

    for message in session.messages().all() {
        let label = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };
        if message.has_tool_calls() {
            for call in message.tool_calls() {
                println!("{label}: [tool call {} {}({})]", call.id, call.name, call.arguments);
            }
        } else if let Some(result) = message.tool_result_part() {
            let output = truncate(&result.content.to_string(), 200);
            println!("{label}: [{}] {output}", result.tool_call_id);
        } else {
            println!("{label}: {}", message.text());
        }
    }
    Ok(())
}

fn print_tool_activity(event: TurnEvent) {
    match &event.payload {
        TurnEventPayload::ToolStarted { call } => {
            eprintln!("⚡ {} ({})", call.name, call.id);
        }
        TurnEventPayload::ToolFinished { result, .. } => {
            let output = truncate(&result.content.to_string(), 200);
            if result.is_error {
                eprintln!("  ❌ {output}");
            } else {
                eprintln!("  ✅ {output}");
            }
        }
        TurnEventPayload::PersistenceFailed { error } => {
            eprintln!("  ⚠ history not saved: {error}");
        }
        _ => {}
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
