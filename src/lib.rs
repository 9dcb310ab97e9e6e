//! toolbus: multi-transport tool invocation for LLM agents
//!
//! Facade crate re-exporting the protocol core and the builtin tool set.
//!
//! - [`core`](toolbus_core) — transports, sessions, registry, dispatch,
//!   client manager
//! - [`tools`] — builtin local tools for the fallback caller
//!
//! ```rust,ignore
//! use toolbus::{BusConfig, ClientManager, FallbackCaller, ServerConfig};
//! use std::sync::Arc;
//!
//! let fallback = FallbackCaller::new(Arc::new(toolbus::tools::default_registry()));
//! let manager = ClientManager::new(
//!     BusConfig::new().with_server(ServerConfig::socket("calc", "127.0.0.1:7700")),
//! )
//! .with_fallback(fallback);
//! ```

pub use toolbus_core::*;

/// Builtin tool implementations
pub mod tools {
    pub use toolbus_tools::*;
}
