//! Request failures and their error-envelope form.

use std::fmt;

use broker_types::Reply;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{Command, HandlerError, PROTOCOL_TARGET, SchemaViolation};

/// Stable error kinds carried in `data.kind` of an error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Payload was not a JSON object with a non-empty string `type`.
    DecodeEnvelope,
    /// `type` names nothing in the registry.
    UnknownType,
    /// `command` is not in the type's handler set.
    UnknownCommand,
    /// `data` failed the type's schema.
    Schema,
    /// The type has no handler bound.
    NoHandler,
    /// The bound handler returned an error.
    HandlerFailure,
}

impl ErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DecodeEnvelope => "DecodeEnvelope",
            Self::UnknownType => "UnknownType",
            Self::UnknownCommand => "UnknownCommand",
            Self::Schema => "Schema",
            Self::NoHandler => "NoHandler",
            Self::HandlerFailure => "HandlerFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Failures while decoding or dispatching a request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload is not a usable envelope.
    #[error("malformed envelope: {message}")]
    DecodeEnvelope { message: String },

    /// Type lookup missed.
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    /// Command missing from the type's handler set.
    #[error("unknown command '{command}' for type '{type_name}'")]
    UnknownCommand { type_name: String, command: String },

    /// `data` does not fit the schema.
    #[error("invalid data for type '{type_name}': {source}")]
    Schema {
        type_name: String,
        #[source]
        source: SchemaViolation,
    },

    /// No repository is bound to the type.
    #[error("no handler bound for '{command}' on type '{type_name}'")]
    NoHandler { type_name: String, command: Command },

    /// The bound repository failed.
    #[error("handler for '{command}' on type '{type_name}' failed: {source}")]
    HandlerFailure {
        type_name: String,
        command: Command,
        #[source]
        source: HandlerError,
    },
}

impl ProtocolError {
    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeEnvelope {
            message: message.into(),
        }
    }

    /// Returns the wire kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DecodeEnvelope { .. } => ErrorKind::DecodeEnvelope,
            Self::UnknownType { .. } => ErrorKind::UnknownType,
            Self::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::NoHandler { .. } => ErrorKind::NoHandler,
            Self::HandlerFailure { .. } => ErrorKind::HandlerFailure,
        }
    }

    /// Message placed in `data.message`.
    ///
    /// `UnknownType` carries the canonical type name; handler failures carry
    /// the handler's own message.
    #[must_use]
    pub fn wire_message(&self) -> String {
        match self {
            Self::UnknownType { name } => name.clone(),
            Self::HandlerFailure { source, .. } => source.message().to_owned(),
            other => other.to_string(),
        }
    }

    /// Builds the error reply for this failure.
    #[must_use]
    pub fn to_reply(&self) -> Reply {
        Reply::error(self.kind().as_str(), self.wire_message())
    }

    /// Logs the failure at the level its kind calls for.
    pub(crate) fn log(&self) {
        let kind = self.kind().as_str();
        match self {
            Self::DecodeEnvelope { .. } => {
                error!(target: PROTOCOL_TARGET, kind, error = %self, "failed to decode envelope");
            }
            Self::UnknownType { .. } | Self::UnknownCommand { .. } | Self::Schema { .. } => {
                debug!(target: PROTOCOL_TARGET, kind, error = %self, "request rejected");
            }
            Self::NoHandler { .. } => {
                info!(target: PROTOCOL_TARGET, kind, error = %self, "no handler bound");
            }
            Self::HandlerFailure { .. } => {
                warn!(target: PROTOCOL_TARGET, kind, error = %self, "handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn unknown_type_message_is_the_type_name() {
        let reply = ProtocolError::UnknownType {
            name: "widget".to_owned(),
        }
        .to_reply();
        let body = reply.error_body().expect("error body");
        assert_eq!(body.kind, "UnknownType");
        assert_eq!(body.message, "widget");
    }

    #[test]
    fn handler_failure_carries_handler_message() {
        let error = ProtocolError::HandlerFailure {
            type_name: "user".to_owned(),
            command: Command::Create,
            source: HandlerError::new("duplicate email"),
        };
        let body = error.to_reply().error_body().expect("error body");
        assert_eq!(body.kind, "HandlerFailure");
        assert_eq!(body.message, "duplicate email");
    }

    #[rstest]
    #[case(ProtocolError::decode("empty payload"), "DecodeEnvelope")]
    #[case(
        ProtocolError::UnknownCommand { type_name: "ping".to_owned(), command: "create".to_owned() },
        "UnknownCommand"
    )]
    #[case(
        ProtocolError::NoHandler { type_name: "user".to_owned(), command: Command::FindAll },
        "NoHandler"
    )]
    fn kinds_have_stable_wire_names(#[case] error: ProtocolError, #[case] expected: &str) {
        assert_eq!(error.kind().as_str(), expected);
        assert!(error.to_reply().is_error());
    }
}
