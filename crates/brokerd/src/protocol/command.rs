//! Commands a request can run against a registered type.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Action requested by an envelope.
///
/// The wire form is camelCase (`findAll`); parsing ignores ASCII case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command {
    /// Create a new instance.
    Create,
    /// Fetch a single instance.
    FindOne,
    /// Fetch every matching instance.
    FindAll,
    /// Modify an existing instance.
    Update,
    /// Remove an instance.
    Delete,
    /// Enumerate instances.
    List,
}

impl Command {
    /// Every command, in wire order.
    pub const ALL: [Self; 6] = [
        Self::Create,
        Self::FindOne,
        Self::FindAll,
        Self::Update,
        Self::Delete,
        Self::List,
    ];

    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::FindOne => "findOne",
            Self::FindAll => "findAll",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Raised when text names no known command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command '{0}'")]
pub struct CommandParseError(pub String);

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        Self::ALL
            .into_iter()
            .find(|command| command.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| CommandParseError(input.to_owned()))
    }
}
