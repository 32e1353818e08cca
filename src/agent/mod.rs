//! Agents and the sessions they converse in.

#[allow(clippy::module_inception)]
mod agent;
mod session;

pub use agent::{Agent, AgentBuilder, AgentShape};
pub use session::{Session, SessionSnapshot};
