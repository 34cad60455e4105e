//! Typed registration for Rust types carried in envelopes.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Command, Schema};

/// A Rust type that can travel as the `data` of an envelope.
///
/// Registering a model with [`ModelRegistry::register_model`] installs its
/// schema and handler set under [`Model::TYPE`]; [`Envelope::data_as`] and
/// [`Envelope::for_model`] convert between envelopes and the Rust value.
///
/// [`ModelRegistry::register_model`]: super::ModelRegistry::register_model
/// [`Envelope::data_as`]: super::Envelope::data_as
/// [`Envelope::for_model`]: super::Envelope::for_model
pub trait Model: Serialize + DeserializeOwned {
    /// Logical type name; matched case-insensitively.
    const TYPE: &'static str;

    /// Shape of the type's `data`.
    fn schema() -> Schema;

    /// Commands the type accepts.
    fn commands() -> Vec<Command> {
        Command::ALL.to_vec()
    }

    /// Command used when a request omits one.
    fn default_command() -> Command {
        Command::FindAll
    }
}
