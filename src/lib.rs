//! MCP tool server over the Loki HTTP query API.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod interval;
pub mod mcp;
pub mod model;
pub mod normalize;
pub mod params;
pub mod tools;
