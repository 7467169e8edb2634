// Firefly Desk - Backoffice as Agent
// Chat-driven assistant over a service catalog, knowledge base, and durable
// workflow engine.

pub mod agent;
pub mod api;
pub mod audit;
pub mod auth;
pub mod callbacks;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod feedback;
pub mod jobs;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod server;
pub mod tools;
pub mod widgets;
pub mod workflows;
pub mod workspaces;

pub use config::DeskConfig;
pub use error::{DeskError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
