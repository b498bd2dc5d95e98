//! Compute Collaborator
//!
//! The engine never knows what a node does. Every invocation goes through
//! one [`Compute`] implementation injected into the [`super::Executor`]:
//! it receives the fully merged argument map and returns the node's raw
//! result.
//!
//! Most embedding applications dispatch on a discriminator key; the
//! [`OperationRegistry`] is a ready-made lookup table for that.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::error::OperationError;
use crate::value::ArgMap;

const TRACING_TARGET: &str = "conflux::engine::compute";

/// Default key consulted by [`OperationRegistry`].
pub const DEFAULT_DISCRIMINATOR: &str = "op";

/// Future returned by a compute call.
pub type ComputeFuture = BoxFuture<'static, Result<ArgMap, OperationError>>;

/// The per-node computation, supplied once per application.
pub trait Compute: Send + Sync + 'static {
    fn compute(&self, args: ArgMap) -> ComputeFuture;
}

impl<F, Fut> Compute for F
where
    F: Fn(ArgMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ArgMap, OperationError>> + Send + 'static,
{
    fn compute(&self, args: ArgMap) -> ComputeFuture {
        self(args).boxed()
    }
}

type Handler = Arc<dyn Fn(ArgMap) -> ComputeFuture + Send + Sync>;

/// Dispatch table from operation name to handler.
#[derive(Clone)]
pub struct OperationRegistry {
    discriminator: String,
    handlers: HashMap<String, Handler>,
}

impl OperationRegistry {
    /// Create an empty registry keyed on [`DEFAULT_DISCRIMINATOR`].
    pub fn new() -> Self {
        Self::with_discriminator(DEFAULT_DISCRIMINATOR)
    }

    /// Create an empty registry keyed on a custom argument.
    pub fn with_discriminator(key: impl Into<String>) -> Self {
        Self {
            discriminator: key.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Register an async handler. A later registration replaces an earlier
    /// one under the same name.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(ArgMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ArgMap, OperationError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| handler(args).boxed());
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Register a synchronous handler.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&ArgMap) -> Result<ArgMap, OperationError> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(name, move |args: ArgMap| {
            let handler = Arc::clone(&handler);
            async move { handler(&args) }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Compute for OperationRegistry {
    fn compute(&self, args: ArgMap) -> ComputeFuture {
        let name = match require(&args, &self.discriminator) {
            Ok(Value::String(name)) => name.clone(),
            Ok(other) => {
                let err = OperationError::InvalidArgument {
                    key: self.discriminator.clone(),
                    reason: format!("expected a string, found {other}"),
                };
                return futures_util::future::ready(Err(err)).boxed();
            }
            Err(err) => return futures_util::future::ready(Err(err)).boxed(),
        };

        match self.handlers.get(&name) {
            Some(handler) => {
                tracing::trace!(target: TRACING_TARGET, operation = %name, "Dispatching");
                handler(args)
            }
            None => {
                futures_util::future::ready(Err(OperationError::UnknownOperation(name))).boxed()
            }
        }
    }
}

/// Fetch a required argument.
pub fn require<'a>(args: &'a ArgMap, key: &str) -> Result<&'a Value, OperationError> {
    args.get(key).ok_or_else(|| OperationError::MissingArgument {
        key: key.to_string(),
    })
}

/// Fetch a required numeric argument.
pub fn require_f64(args: &ArgMap, key: &str) -> Result<f64, OperationError> {
    require(args, key)?
        .as_f64()
        .ok_or_else(|| OperationError::InvalidArgument {
            key: key.to_string(),
            reason: "expected a number".to_string(),
        })
}
