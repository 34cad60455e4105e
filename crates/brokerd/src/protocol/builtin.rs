//! Types every broker registers at start-up.
//!
//! `ping` is served by the broker itself. The domain models are registered
//! with their schemas but no repository; embedders bind one with
//! [`ModelRegistry::bind`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{
    Command, FieldKind, HandlerError, Model, ModelRegistry, RegistrationError, Repository, Schema,
};

/// Health check answered with `{"ping": "pong"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Free-form text; ignored by the broker.
    #[serde(default)]
    pub ping: String,
}

impl Model for Ping {
    const TYPE: &'static str = "ping";

    fn schema() -> Schema {
        Schema::new().with_default("ping", FieldKind::String, json!(""))
    }

    fn commands() -> Vec<Command> {
        vec![Command::FindAll]
    }
}

/// Account holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Model for User {
    const TYPE: &'static str = "user";

    fn schema() -> Schema {
        Schema::new()
            .optional("id", FieldKind::Integer)
            .optional("name", FieldKind::String)
            .optional("email", FieldKind::String)
            .optional("roles", FieldKind::Array)
    }
}

/// Named permission bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Model for Role {
    const TYPE: &'static str = "role";

    fn schema() -> Schema {
        Schema::new()
            .optional("id", FieldKind::Integer)
            .optional("name", FieldKind::String)
            .optional("permissions", FieldKind::Array)
    }
}

/// Catalogue item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub price: f64,
}

impl Model for Product {
    const TYPE: &'static str = "product";

    fn schema() -> Schema {
        Schema::new()
            .optional("id", FieldKind::Integer)
            .optional("name", FieldKind::String)
            .optional("sku", FieldKind::String)
            .optional("price", FieldKind::Float)
    }
}

/// Purchase placed by a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub product_ids: Vec<i64>,
    #[serde(default)]
    pub status: String,
}

impl Model for Order {
    const TYPE: &'static str = "order";

    fn schema() -> Schema {
        Schema::new()
            .optional("id", FieldKind::Integer)
            .optional("customer_id", FieldKind::Integer)
            .optional("product_ids", FieldKind::Array)
            .optional("status", FieldKind::String)
    }
}

/// Buyer record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: Option<Value>,
}

impl Model for Customer {
    const TYPE: &'static str = "customer";

    fn schema() -> Schema {
        Schema::new()
            .optional("id", FieldKind::Integer)
            .optional("name", FieldKind::String)
            .optional("email", FieldKind::String)
            .optional("address", FieldKind::Object)
    }
}

fn answer_ping(_command: Command, _data: &Value) -> Result<Value, HandlerError> {
    Ok(json!({ "ping": "pong" }))
}

impl ModelRegistry {
    /// Creates a registry holding `ping` and the unbound domain models.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        if let Err(error) = install_builtins(&mut registry) {
            tracing::error!(
                target: super::PROTOCOL_TARGET,
                error = %error,
                "built-in registration failed"
            );
        }
        registry
    }
}

fn install_builtins(registry: &mut ModelRegistry) -> Result<(), RegistrationError> {
    let ping: Arc<dyn Repository> = Arc::new(answer_ping);
    registry.register_model::<Ping>(Some(ping))?;
    registry.register_model::<User>(None)?;
    registry.register_model::<Role>(None)?;
    registry.register_model::<Product>(None)?;
    registry.register_model::<Order>(None)?;
    registry.register_model::<Customer>(None)
}
