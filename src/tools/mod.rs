// Tool subsystem: catalog-derived tools, custom sandboxed tools, and the
// built-ins that are always available.

pub mod auth_resolver;
pub mod builtin;
pub mod custom;
pub mod factory;
pub mod invoker;
pub mod sandbox;

pub use auth_resolver::AuthResolver;
pub use custom::CustomToolRepository;
pub use factory::{ToolDefinition, ToolFactory};
pub use invoker::ToolInvoker;
pub use sandbox::{SandboxExecutor, SandboxResult};
