//! Repository collaborator bound to a registered type.

use std::error::Error as StdError;

use serde_json::Value;
use thiserror::Error;

use super::Command;

/// Executes commands for one registered type.
///
/// Handlers run on worker threads and must be shareable. Closures of the
/// form `Fn(Command, &Value) -> Result<Value, HandlerError>` implement this
/// trait directly.
#[cfg_attr(test, mockall::automock)]
pub trait Repository: Send + Sync {
    /// Runs `command` with decoded `data` and returns the reply data.
    fn handle(&self, command: Command, data: &Value) -> Result<Value, HandlerError>;
}

impl<F> Repository for F
where
    F: Fn(Command, &Value) -> Result<Value, HandlerError> + Send + Sync,
{
    fn handle(&self, command: Command, data: &Value) -> Result<Value, HandlerError> {
        self(command, data)
    }
}

/// Failure reported by a repository.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Creates an error with a client-visible message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Client-visible message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
