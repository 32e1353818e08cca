//! Parley: a conversational agent loop.
//!
//! Each user turn alternates between asking a [`generator::ResponseGenerator`]
//! for the next step and running whatever tools it requested, until the
//! generator answers in plain text. History lives in a [`agent::Session`] and
//! can be written through to a [`session::SessionStore`] so a conversation
//! picks up where it left off.
//!
//! # Quick Start
//!
//! ```no_run
//! use parley::prelude::*;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let config = ParleyConfig::from_env();
//! let agent = Agent::from_config(&config, AgentShape::WithTools)?;
//! let mut session = agent.new_session();
//! let outcome = agent.send(&mut session, "What's new in Rust?").await?;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod generator;
pub mod http;
pub mod prelude;
pub mod repl;
pub mod session;
pub mod store;
pub mod tools;
pub mod turn;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
