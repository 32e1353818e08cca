//! Tool system: the trait, schemas, and the registry the turn loop dispatches to.

pub mod arguments;
pub mod registry;
pub mod tool;
pub mod types;

#[cfg(feature = "web-search")]
pub mod web_search;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool, ToolExecutionContext};
pub use types::{ParameterBuilder, ToolDefinition, ToolParameters};
