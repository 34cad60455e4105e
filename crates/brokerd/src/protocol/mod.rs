//! Payload codec and model registry.
//!
//! Clients send a self-describing JSON envelope `{type, command, data}`. The
//! registry resolves `type` to a schema and handler set, decodes `data`
//! tolerantly and dispatches the command to the type's repository. Every
//! failure is answered with an error envelope
//! `{"type": "error", "data": {"kind", "message"}}`.

mod builtin;
mod command;
mod envelope;
mod errors;
mod model;
mod registry;
mod repository;
mod schema;

pub use self::builtin::{Customer, Order, Ping, Product, Role, User};
pub use self::command::{Command, CommandParseError};
pub use self::envelope::Envelope;
pub use self::errors::{ErrorKind, ProtocolError};
pub use self::model::Model;
pub use self::registry::{ModelRegistry, RegistrationError, TypeEntry};
#[cfg(test)]
pub(crate) use self::repository::MockRepository;
pub use self::repository::{HandlerError, Repository};
pub use self::schema::{FieldKind, FieldSpec, Schema, SchemaViolation};

pub(crate) const PROTOCOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::protocol");
