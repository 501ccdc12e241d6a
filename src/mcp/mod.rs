//! MCP Server for Second Brain
//!
//! Exposes search, note access and capture to MCP clients over stdio.

mod server;

pub use server::run_mcp_server;
