//! Core protocol library for toolbus
//!
//! Lets an LLM-driven agent invoke tools hosted by independently running
//! servers over a choice of transports, multiplexing any number of
//! in-flight calls per connection and degrading to in-process execution
//! when no remote owner is reachable.
//!
//! ## Layers
//!
//! - [`transport`]: one physical channel (subprocess pipe, server-push
//!   HTTP stream, or TCP socket) moving framed messages both ways
//! - [`Session`]: call/response correlation and multiplexing over one
//!   transport
//! - [`ToolRegistry`] + [`Dispatcher`]: the serving side — named tools with
//!   parameter schemas, executed concurrently
//! - [`ClientManager`]: the client façade — aggregates every configured
//!   server's catalog, routes calls, falls back to a local
//!   [`FallbackCaller`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolbus_core::{BusConfig, ClientManager, ServerConfig};
//!
//! let config = BusConfig::new()
//!     .with_server(ServerConfig::stdio("calc", "calc-server", vec![]))
//!     .with_server(ServerConfig::socket("kb", "127.0.0.1:7700"));
//!
//! let manager = ClientManager::new(config);
//! manager.connect_all().await;
//!
//! let mut args = toolbus_core::ArgMap::new();
//! args.insert("a".into(), 2.into());
//! args.insert("b".into(), 3.into());
//! let outcome = manager.call_tool("calc::add", args, None).await?;
//! ```

pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::{BusConfig, ServerConfig, TransportKind};
pub use descriptor::{ParamSpec, ParamType, ToolDescriptor, bind_arguments};
pub use dispatcher::{Dispatcher, serve_socket, serve_stdio};
pub use error::BusError;
pub use fallback::FallbackCaller;
pub use manager::{CallOutcome, CatalogEntry, ClientManager, NAMESPACE_SEPARATOR, Resolution};
pub use protocol::{
    ArgMap, CallEnvelope, Envelope, ResultEnvelope, ServerInfo, WireError, WireErrorKind,
};
pub use registry::{FnTool, Tool, ToolRegistry};
pub use session::Session;
pub use transport::Transport;
