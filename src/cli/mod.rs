//! Command-line surface for the `parley` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::agent::AgentShape;
use crate::config::ParleyConfig;

/// Chat with a tool-using agent that remembers sessions.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Parley: conversational agent with tools and memory")]
pub struct Cli {
    /// Optional TOML config file, applied beneath environment variables
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat
    Chat(ChatArgs),
    /// Print a stored session's transcript
    History(HistoryArgs),
}

/// Arguments for `parley chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Session id; history is loaded from and saved to the session database
    #[arg(short = 'S', long)]
    pub session: Option<String>,

    /// Session database path (":memory:" keeps history in-process)
    #[arg(long)]
    pub db: Option<String>,

    /// Plain chatbot: no web search and no stored history
    #[arg(long, conflicts_with = "session")]
    pub no_tools: bool,

    /// Anthropic model id
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Upper bound on generation rounds per turn
    #[arg(long)]
    pub max_rounds: Option<usize>,
}

impl ChatArgs {
    /// Flags win over whatever the config already holds.
    pub fn apply(&self, config: &mut ParleyConfig) {
        if let Some(db) = &self.db {
            config.session_db = db.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(system) = &self.system {
            config.system_prompt = Some(system.clone());
        }
        if let Some(max_rounds) = self.max_rounds {
            config.max_rounds = max_rounds;
        }
    }

    pub fn shape(&self) -> AgentShape {
        if self.no_tools {
            AgentShape::Basic
        } else if self.session.is_some() {
            AgentShape::WithMemory
        } else {
            AgentShape::WithTools
        }
    }
}

/// Arguments for `parley history`.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Session id to print
    #[arg(short = 'S', long)]
    pub session: String,

    /// Session database path
    #[arg(long)]
    pub db: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_defaults() {
        let cli = Cli::try_parse_from(["parley", "chat"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert!(args.session.is_none());
                assert!(!args.no_tools);
                assert_eq!(args.shape(), AgentShape::WithTools);
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_session_uses_memory() {
        let cli = Cli::try_parse_from([
            "parley", "chat", "--session", "1", "--db", "/tmp/s.db", "--max-rounds", "4",
        ])
        .unwrap();
        let Commands::Chat(args) = cli.command else {
            panic!("expected Chat");
        };
        assert_eq!(args.shape(), AgentShape::WithMemory);

        let mut config = ParleyConfig::default();
        args.apply(&mut config);
        assert_eq!(config.session_db, "/tmp/s.db");
        assert_eq!(config.max_rounds, 4);
    }

    #[test]
    fn no_tools_conflicts_with_session() {
        assert!(Cli::try_parse_from(["parley", "chat", "--no-tools", "-S", "1"]).is_err());
        let cli = Cli::try_parse_from(["parley", "chat", "--no-tools"]).unwrap();
        let Commands::Chat(args) = cli.command else {
            panic!("expected Chat");
        };
        assert_eq!(args.shape(), AgentShape::Basic);
    }

    #[test]
    fn history_requires_session() {
        assert!(Cli::try_parse_from(["parley", "history"]).is_err());
        let cli = Cli::try_parse_from(["parley", "history", "--session", "abc"]).unwrap();
        assert!(matches!(cli.command, Commands::History(args) if args.session == "abc"));
    }
}
