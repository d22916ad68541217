//! ToolHive MCP server: exposes ToolHive's remote-management surface
//! (run/stop/list/search/inspect MCP servers) as MCP tools and resources
//! over stdio, auto-starting the ToolHive API server when it is not
//! already running.

pub mod api;
pub mod cli;
pub mod dispatcher;
pub mod server;
pub mod supervisor;
pub mod websearch;

#[cfg(test)]
mod testutil;

pub use dispatcher::Dispatcher;
pub use server::ToolHiveServer;
pub use supervisor::ApiSupervisor;
