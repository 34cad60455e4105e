//! Envelope codec.
//!
//! Decoding validates in a fixed order: the payload must be a JSON object
//! with a non-empty string `type`; the type must be registered; the command
//! (or the type's default) must be in its handler set; `data` must satisfy
//! the type's schema.

use broker_types::Request;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{Command, Model, ModelRegistry, ProtocolError};

/// Decoded request: canonical type name, resolved command and schema-shaped
/// data.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    type_name: String,
    command: Command,
    data: Value,
}

impl Envelope {
    /// Creates an envelope; the type name is stored lowercase.
    pub fn new(type_name: &str, command: Command, data: Value) -> Self {
        Self {
            type_name: type_name.trim().to_ascii_lowercase(),
            command,
            data,
        }
    }

    /// Wraps a model value.
    pub fn for_model<T: Model>(command: Command, model: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(T::TYPE, command, serde_json::to_value(model)?))
    }

    /// Canonical (lowercase) type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Command to run.
    #[must_use]
    pub fn command(&self) -> Command {
        self.command
    }

    /// Decoded `data` object.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Deserialises `data` into a Rust value.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    /// Encodes the envelope as `{type, command, data}`.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        Request::new(self.type_name.clone())
            .with_command(self.command.as_str())
            .with_data(self.data.clone())
            .to_bytes()
    }
}

pub(crate) fn decode(payload: &[u8], registry: &ModelRegistry) -> Result<Envelope, ProtocolError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::decode("empty payload"));
    }
    let value: Value = serde_json::from_slice(payload)
        .map_err(|error| ProtocolError::decode(error.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::decode("envelope must be a JSON object"));
    };
    let requested = type_field(&object)?;
    let entry = registry
        .lookup(&requested)
        .ok_or_else(|| ProtocolError::UnknownType {
            name: requested.to_ascii_lowercase(),
        })?;
    let command = match object.get("command") {
        None | Some(Value::Null) => entry.default_command(),
        Some(Value::String(text)) => text
            .parse::<Command>()
            .ok()
            .filter(|command| entry.accepts(*command))
            .ok_or_else(|| ProtocolError::UnknownCommand {
                type_name: entry.name().to_owned(),
                command: text.clone(),
            })?,
        Some(other) => {
            return Err(ProtocolError::UnknownCommand {
                type_name: entry.name().to_owned(),
                command: other.to_string(),
            });
        }
    };
    let raw_data = object.remove("data");
    let data = entry
        .schema()
        .decode(raw_data.as_ref())
        .map_err(|source| ProtocolError::Schema {
            type_name: entry.name().to_owned(),
            source,
        })?;
    Ok(Envelope {
        type_name: entry.name().to_owned(),
        command,
        data,
    })
}

fn type_field(object: &Map<String, Value>) -> Result<String, ProtocolError> {
    match object.get("type") {
        Some(Value::String(name)) if !name.trim().is_empty() => Ok(name.trim().to_owned()),
        Some(Value::String(_)) => Err(ProtocolError::decode("type field is empty")),
        Some(_) => Err(ProtocolError::decode("type field must be a string")),
        None => Err(ProtocolError::decode("missing type field")),
    }
}
