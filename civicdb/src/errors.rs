use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by civicdb repositories.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Query composition failed before anything reached the database.
    #[error("query builder error: {0}")]
    QueryBuilder(#[from] QueryBuilderError),

    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Underlying SQL statement failed.
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    /// An entity or payload could not be (de)serialized for the cache or a topic.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// A row returned by the database could not be mapped to an entity.
    #[error("row mapping failed: {message}")]
    RowMapping { message: String },

    /// Invalid input supplied to a repository operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Failures raised while turning an entity into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuilderError {
    /// The entity type carries no `#[query(table = "...")]`.
    #[error("entity `{entity}` does not declare a table")]
    MissingTable { entity: &'static str },

    /// A schema, table or column name is not a plain SQL identifier.
    #[error("`{identifier}` is not a valid SQL identifier")]
    InvalidIdentifier { identifier: String },

    /// The tenant id has no segment to derive a schema from.
    #[error("cannot derive a schema from tenant `{tenant_id}`")]
    InvalidTenant { tenant_id: String },

    /// The table lives in a per-tenant schema but no tenant was given.
    #[error("table `{table}` is tenant-scoped; use the tenant-aware lookup")]
    TenantRequired { table: String },

    /// The SQL references `:name` but no value was bound for it.
    #[error("no value bound for parameter `{name}`")]
    UnboundParameter { name: String },
}

/// Failures while loading or validating [`crate::config::Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}
