//! Caller identity.
//!
//! Tokens are issued by the login endpoints, which live outside this service;
//! here they are opaque strings resolved to a [`Caller`].

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Caller {
    #[default]
    Guest,
    Customer(Uuid),
    Admin(Uuid),
}

impl Caller {
    /// Owner recorded on orders this caller places. Only customers own orders.
    pub fn owner_id(&self) -> Option<Uuid> {
        match self { Self::Customer(id) => Some(*id), _ => None }
    }

    pub fn is_authenticated(&self) -> bool { !matches!(self, Self::Guest) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn caller(self, subject: Uuid) -> Caller {
        match self { Self::Customer => Caller::Customer(subject), Self::Admin => Caller::Admin(subject) }
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when the token is unknown or expired.
    async fn resolve(&self, token: &str) -> Result<Option<Caller>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgIdentityProvider {
    pool: PgPool,
}

impl PgIdentityProvider {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    subject_id: Uuid,
    role: String,
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Option<Caller>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT subject_id, role FROM sessions WHERE token = $1 AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.role.parse::<Role>().map(|role| role.caller(r.subject_id)).map_err(StoreError::Corrupt))
            .transpose()
    }
}

/// Fixed token table, for development without a database and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Caller>,
}

impl StaticIdentityProvider {
    pub fn new(tokens: impl IntoIterator<Item = (String, Caller)>) -> Self {
        Self { tokens: tokens.into_iter().collect() }
    }

    pub fn with_token(mut self, token: impl Into<String>, caller: Caller) -> Self {
        self.tokens.insert(token.into(), caller);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Option<Caller>, StoreError> {
        Ok(self.tokens.get(token).copied().filter(Caller::is_authenticated))
    }
}
