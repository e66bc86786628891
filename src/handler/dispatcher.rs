//! Request routing.
//!
//! A [`Dispatcher`] either hands every request to one handler, or reads a
//! `[name, argument]` pair and looks `name` up in a [`CommandTable`]. Routing
//! is synchronous; the handler's future is returned unawaited so the caller
//! decides where it runs.

use std::sync::Arc;

use serde_json::Value;

use super::registry::{BoxFuture, CommandTable, Handler};
use crate::error::{RpcError, Result};

/// Dispatch policy, fixed when the server is built.
#[derive(Clone)]
pub enum Dispatcher {
    /// Every request goes to one handler.
    Single(Arc<dyn Handler>),
    /// Requests are `[name, argument]` pairs routed by name.
    Table(Arc<CommandTable>),
}

impl Dispatcher {
    /// Dispatcher with a single handler.
    pub fn single<H: Handler>(handler: H) -> Self {
        Dispatcher::Single(Arc::new(handler))
    }

    /// Dispatcher over a command table.
    pub fn table(table: CommandTable) -> Self {
        Dispatcher::Table(Arc::new(table))
    }

    /// Resolve the handler for `request` and the value it receives.
    ///
    /// # Errors
    ///
    /// For table dispatch: `MalformedCommand` if the request is not a
    /// two-element array with a string name, `UnknownCommand` if the name is
    /// not registered. No handler is invoked in either case.
    pub fn route(&self, request: Value) -> Result<(Arc<dyn Handler>, Value)> {
        match self {
            Dispatcher::Single(handler) => Ok((handler.clone(), request)),
            Dispatcher::Table(table) => {
                let (name, argument) = split_command(request)?;
                let handler = table
                    .get(&name)
                    .ok_or(RpcError::UnknownCommand(name))?;
                Ok((handler.clone(), argument))
            }
        }
    }

    /// Route `request` and start its handler.
    ///
    /// The handler is called immediately; the returned future settles with
    /// its outcome. Routing failures settle immediately.
    pub fn dispatch(&self, request: Value) -> BoxFuture<'static, Result<Value>> {
        match self.route(request) {
            Ok((handler, argument)) => {
                let fut = handler.call(argument);
                Box::pin(async move { fut.await.map_err(RpcError::from) })
            }
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatcher::Single(_) => f.write_str("Dispatcher::Single"),
            Dispatcher::Table(table) => f.debug_tuple("Dispatcher::Table").field(table).finish(),
        }
    }
}

/// Split a table request into its command name and argument.
fn split_command(request: Value) -> Result<(String, Value)> {
    let Value::Array(mut items) = request else {
        return Err(RpcError::MalformedCommand(
            "expected a [name, argument] array".to_string(),
        ));
    };
    if items.len() != 2 {
        return Err(RpcError::MalformedCommand(format!(
            "expected 2 elements, got {}",
            items.len()
        )));
    }

    let argument = items.pop().unwrap_or(Value::Null);
    match items.pop() {
        Some(Value::String(name)) => Ok((name, argument)),
        _ => Err(RpcError::MalformedCommand(
            "command name must be a string".to_string(),
        )),
    }
}
