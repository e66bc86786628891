//! Handler module - request handling and dispatch.
//!
//! Provides:
//! - [`Handler`] - the handler trait, with [`TypedHandler`] and [`SyncHandler`] adapters
//! - [`CommandTable`] - maps command names to handlers
//! - [`Dispatcher`] - single-handler or table routing
//!
//! # Example
//!
//! ```
//! use pipe_rpc::handler::{CommandTable, Dispatcher, SyncHandler};
//! use serde_json::{json, Value};
//!
//! let mut table = CommandTable::new();
//! table.insert("echo", SyncHandler::new(|v: Value| Ok(v)));
//!
//! let dispatcher = Dispatcher::table(table);
//! let (_handler, argument) = dispatcher.route(json!(["echo", {"a": 1}])).unwrap();
//! assert_eq!(argument, json!({"a": 1}));
//! ```

mod dispatcher;
mod registry;

pub use dispatcher::Dispatcher;
pub use registry::{
    BoxFuture, CommandTable, Handler, HandlerResult, SyncHandler, TypedHandler,
};
