//! Collaborators the tasks talk to: the warehouse and the object store.
//!
//! The engine only depends on the [`Warehouse`] and [`ObjectStore`] traits.
//! Connection setup, pooling and timeouts belong to the implementations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StardagError, TaskError};

/// A single value returned by a warehouse query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

pub type Row = Vec<Scalar>;

/// Object store access keys handed to the store on every copy.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Resolve credentials through `lookup`, which maps a variable name to
    /// its value (usually `std::env::var`).
    pub fn resolve_with<F>(access_key_var: &str, secret_key_var: &str, lookup: F) -> Result<Self, StardagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |name: &str| {
            lookup(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                StardagError::Credentials(format!("environment variable '{name}' is not set"))
            })
        };
        Ok(Self::new(fetch(access_key_var)?, fetch(secret_key_var)?))
    }

    pub fn from_env(access_key_var: &str, secret_key_var: &str) -> Result<Self, StardagError> {
        Self::resolve_with(access_key_var, secret_key_var, |name| std::env::var(name).ok())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Columnar warehouse reachable through SQL.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64, TaskError>;

    /// Run a query and return its rows.
    async fn query(&self, sql: &str) -> Result<Vec<Row>, TaskError>;
}

/// Bulk loader from an object store prefix into a warehouse table.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn copy(
        &self,
        source_uri: &str,
        target_table: &str,
        credentials: &Credentials,
        format: &str,
    ) -> Result<(), TaskError>;
}

/// Client handles shared by every task of a run.
#[derive(Clone)]
pub struct Clients {
    pub warehouse: Arc<dyn Warehouse>,
    pub object_store: Arc<dyn ObjectStore>,
    pub credentials: Credentials,
}

impl Clients {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        object_store: Arc<dyn ObjectStore>,
        credentials: Credentials,
    ) -> Self {
        Self {
            warehouse,
            object_store,
            credentials,
        }
    }
}

impl fmt::Debug for Clients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clients")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
