//! MCP server exposing Grafana Loki log queries and label discovery as tools.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod model;
pub mod normalize;
pub mod params;
pub mod schema;
pub mod timeparse;
pub mod tools;
