//! In-process table of the types a broker understands.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use broker_types::Reply;
use thiserror::Error;

use super::envelope::decode;
use super::{Command, Envelope, Model, PROTOCOL_TARGET, ProtocolError, Repository, Schema};

/// One registered type: schema, handler set, default command and the
/// optional repository that serves it.
#[derive(Clone)]
pub struct TypeEntry {
    name: String,
    schema: Schema,
    commands: BTreeSet<Command>,
    default_command: Command,
    handler: Option<Arc<dyn Repository>>,
}

impl TypeEntry {
    /// Creates an entry accepting every command, defaulting to `findAll`.
    #[must_use]
    pub fn new(name: &str, schema: Schema) -> Self {
        Self {
            name: name.trim().to_ascii_lowercase(),
            schema,
            commands: Command::ALL.into_iter().collect(),
            default_command: Command::FindAll,
            handler: None,
        }
    }

    /// Restricts the handler set.
    #[must_use]
    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands = commands.into_iter().collect();
        self
    }

    /// Sets the command used when a request omits one.
    #[must_use]
    pub fn with_default_command(mut self, command: Command) -> Self {
        self.default_command = command;
        self
    }

    /// Binds the repository serving this type.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn Repository>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema applied to `data`.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Handler set.
    #[must_use]
    pub fn commands(&self) -> &BTreeSet<Command> {
        &self.commands
    }

    /// Returns true when `command` is in the handler set.
    #[must_use]
    pub fn accepts(&self, command: Command) -> bool {
        self.commands.contains(&command)
    }

    /// Command used when a request omits one.
    #[must_use]
    pub fn default_command(&self) -> Command {
        self.default_command
    }

    /// Returns true when a repository is bound.
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TypeEntry")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("commands", &self.commands)
            .field("default_command", &self.default_command)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Failures while installing types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// Type names must contain a non-whitespace character.
    #[error("type name must not be empty")]
    EmptyName,
    /// The registry is append-only.
    #[error("type '{name}' is already registered")]
    Duplicate { name: String },
    /// Binding targets a type that was never registered.
    #[error("type '{name}' is not registered")]
    UnknownType { name: String },
    /// The default command must be servable.
    #[error("default command '{command}' of type '{name}' is not in its handler set")]
    DefaultNotAccepted { name: String, command: Command },
}

/// Append-only mapping from lowercase type names to [`TypeEntry`] values.
///
/// Populate the registry before starting a broker; workers share it
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, TypeEntry>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an entry.
    pub fn register(&mut self, entry: TypeEntry) -> Result<(), RegistrationError> {
        if entry.name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        if !entry.accepts(entry.default_command) {
            return Err(RegistrationError::DefaultNotAccepted {
                name: entry.name,
                command: entry.default_command,
            });
        }
        if self.entries.contains_key(&entry.name) {
            return Err(RegistrationError::Duplicate { name: entry.name });
        }
        tracing::debug!(
            target: PROTOCOL_TARGET,
            type_name = %entry.name,
            commands = entry.commands.len(),
            handler = entry.has_handler(),
            "registered type"
        );
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Installs `name` with the full command set and an optional handler.
    pub fn register_type(
        &mut self,
        name: &str,
        schema: Schema,
        handler: Option<Arc<dyn Repository>>,
    ) -> Result<(), RegistrationError> {
        let entry = TypeEntry::new(name, schema);
        self.register(match handler {
            Some(handler) => entry.with_handler(handler),
            None => entry,
        })
    }

    /// Installs a [`Model`] type.
    pub fn register_model<T: Model>(
        &mut self,
        handler: Option<Arc<dyn Repository>>,
    ) -> Result<(), RegistrationError> {
        let entry = TypeEntry::new(T::TYPE, T::schema())
            .with_commands(T::commands())
            .with_default_command(T::default_command());
        self.register(match handler {
            Some(handler) => entry.with_handler(handler),
            None => entry,
        })
    }

    /// Binds or replaces the repository of an already registered type.
    pub fn bind(&mut self, name: &str, handler: Arc<dyn Repository>) -> Result<(), RegistrationError> {
        let key = name.trim().to_ascii_lowercase();
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(RegistrationError::UnknownType { name: key })?;
        entry.handler = Some(handler);
        Ok(())
    }

    /// Finds an entry by name, ignoring ASCII case.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&TypeEntry> {
        self.entries.get(&name.trim().to_ascii_lowercase())
    }

    /// Registered names in sorted order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decodes a payload into an [`Envelope`].
    pub fn decode(&self, payload: &[u8]) -> Result<Envelope, ProtocolError> {
        decode(payload, self)
    }

    /// Runs a decoded envelope against its type's repository.
    pub fn dispatch(&self, envelope: &Envelope) -> Result<Reply, ProtocolError> {
        let entry = self
            .lookup(envelope.type_name())
            .ok_or_else(|| ProtocolError::UnknownType {
                name: envelope.type_name().to_owned(),
            })?;
        if !entry.accepts(envelope.command()) {
            return Err(ProtocolError::UnknownCommand {
                type_name: entry.name.clone(),
                command: envelope.command().as_str().to_owned(),
            });
        }
        let handler = entry.handler.as_ref().ok_or_else(|| ProtocolError::NoHandler {
            type_name: entry.name.clone(),
            command: envelope.command(),
        })?;
        let data = handler
            .handle(envelope.command(), envelope.data())
            .map_err(|source| ProtocolError::HandlerFailure {
                type_name: entry.name.clone(),
                command: envelope.command(),
                source,
            })?;
        Ok(Reply::new(entry.name.clone(), data))
    }

    /// Decodes and dispatches one payload, always producing a reply.
    ///
    /// Failures are logged and turned into error replies.
    pub fn handle(&self, payload: &[u8]) -> Reply {
        match self.decode(payload).and_then(|envelope| self.dispatch(&envelope)) {
            Ok(reply) => reply,
            Err(error) => {
                error.log();
                error.to_reply()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::protocol::{FieldKind, HandlerError, MockRepository};

    fn user_schema() -> Schema {
        Schema::new()
            .optional("id", FieldKind::Integer)
            .optional("name", FieldKind::String)
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let mut registry = ModelRegistry::new();
        registry
            .register_type("Thing", Schema::new(), None)
            .expect("first");
        let error = registry
            .register_type("thing", Schema::new(), None)
            .expect_err("duplicate");
        assert_eq!(
            error,
            RegistrationError::Duplicate {
                name: "thing".to_owned()
            }
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn empty_names_are_rejected(#[case] name: &str) {
        let error = ModelRegistry::new()
            .register_type(name, Schema::new(), None)
            .expect_err("empty");
        assert_eq!(error, RegistrationError::EmptyName);
    }

    #[test]
    fn default_command_must_be_accepted() {
        let entry = TypeEntry::new("audit", Schema::new()).with_commands([Command::Create]);
        let error = ModelRegistry::new().register(entry).expect_err("default");
        assert!(matches!(error, RegistrationError::DefaultNotAccepted { .. }));
    }

    #[test]
    fn binding_requires_a_registered_type() {
        let handler: Arc<dyn Repository> = Arc::new(MockRepository::new());
        let error = ModelRegistry::new()
            .bind("ghost", handler)
            .expect_err("unregistered");
        assert!(matches!(error, RegistrationError::UnknownType { .. }));
    }

    #[test]
    fn bound_repository_receives_decoded_data() {
        let mut repository = MockRepository::new();
        repository
            .expect_handle()
            .with(eq(Command::FindOne), eq(json!({ "id": 3 })))
            .times(1)
            .returning(|_, _| Ok(json!({ "id": 3, "name": "ada" })));
        let mut registry = ModelRegistry::new();
        registry
            .register_type("user", user_schema(), Some(Arc::new(repository)))
            .expect("register");

        let reply = registry.handle(br#"{"type":"User","command":"findOne","data":{"id":3,"extra":true}}"#);

        assert_eq!(reply, Reply::new("user", json!({ "id": 3, "name": "ada" })));
    }

    #[test]
    fn repository_errors_become_handler_failures() {
        let mut repository = MockRepository::new();
        repository
            .expect_handle()
            .with(eq(Command::Create), always())
            .returning(|_, _| Err(HandlerError::new("email already taken")));
        let mut registry = ModelRegistry::new();
        registry
            .register_type("user", user_schema(), Some(Arc::new(repository)))
            .expect("register");

        let reply = registry.handle(br#"{"type":"user","command":"create","data":{"name":"x"}}"#);

        let body = reply.error_body().expect("error reply");
        assert_eq!(body.kind, "HandlerFailure");
        assert_eq!(body.message, "email already taken");
    }

    #[test]
    fn unbound_types_report_no_handler() {
        let mut registry = ModelRegistry::new();
        registry
            .register_type("order", Schema::new(), None)
            .expect("register");
        let body = registry
            .handle(br#"{"type":"order"}"#)
            .error_body()
            .expect("error reply");
        assert_eq!(body.kind, "NoHandler");
    }

    #[test]
    fn empty_registry_reports_unknown_type() {
        let body = ModelRegistry::new()
            .handle(br#"{"type":"widget"}"#)
            .error_body()
            .expect("error reply");
        assert_eq!(body.kind, "UnknownType");
        assert_eq!(body.message, "widget");
    }

    #[test]
    fn late_binding_serves_an_existing_type() {
        let mut registry = ModelRegistry::new();
        registry
            .register_type("role", Schema::new(), None)
            .expect("register");
        let handler = |_: Command, _: &Value| -> Result<Value, HandlerError> { Ok(json!([])) };
        registry.bind("ROLE", Arc::new(handler)).expect("bind");

        assert_eq!(registry.handle(br#"{"type":"role"}"#), Reply::new("role", json!([])));
    }
}
