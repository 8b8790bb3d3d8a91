use std::borrow::Cow;

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{
    PgPool, Postgres, Row,
    postgres::{PgArguments, PgPoolOptions, PgRow},
    query::Query,
};

use crate::{errors::RepoError, query::NamedParams, types::SqlValue};

/// Runs statements written with `:name` markers.
#[allow(async_fn_in_trait)]
pub trait SqlExecutor {
    type Row;

    async fn fetch_all(&self, sql: &str, params: &NamedParams) -> Result<Vec<Self::Row>, RepoError>;

    /// First column of every row as text.
    async fn fetch_strings(&self, sql: &str, params: &NamedParams) -> Result<Vec<String>, RepoError>;

    /// First column of the first row as a count.
    async fn fetch_count(&self, sql: &str, params: &NamedParams) -> Result<i64, RepoError>;
}

/// Turns one result row into an entity.
pub trait RowMapper<R, T> {
    fn map_row(&self, row: &R) -> Result<T, RepoError>;
}

impl<R, T, F> RowMapper<R, T> for F
where
    F: Fn(&R) -> Result<T, RepoError>,
{
    fn map_row(&self, row: &R) -> Result<T, RepoError> {
        self(row)
    }
}

/// Maps Postgres rows through the entity's `sqlx::FromRow` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FromRowMapper;

impl<T> RowMapper<PgRow, T> for FromRowMapper
where
    T: for<'r> sqlx::FromRow<'r, PgRow>,
{
    fn map_row(&self, row: &PgRow) -> Result<T, RepoError> {
        T::from_row(row).map_err(|err| RepoError::RowMapping {
            message: err.to_string(),
        })
    }
}

/// Maps JSON object rows by deserializing them into the entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRowMapper;

impl<T> RowMapper<Value, T> for JsonRowMapper
where
    T: DeserializeOwned,
{
    fn map_row(&self, row: &Value) -> Result<T, RepoError> {
        T::deserialize(row).map_err(|err| RepoError::RowMapping {
            message: err.to_string(),
        })
    }
}

/// [`SqlExecutor`] over a Postgres pool.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RepoError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn rows(&self, sql: &str, params: &NamedParams) -> Result<Vec<PgRow>, RepoError> {
        let (positional, values) = params.to_positional(sql)?;
        debug!("executing `{positional}` with {} bound values", values.len());
        let query = values.into_iter().fold(sqlx::query(&positional), bind_value);
        Ok(query.fetch_all(&self.pool).await?)
    }
}

impl SqlExecutor for PgExecutor {
    type Row = PgRow;

    async fn fetch_all(&self, sql: &str, params: &NamedParams) -> Result<Vec<PgRow>, RepoError> {
        self.rows(sql, params).await
    }

    async fn fetch_strings(&self, sql: &str, params: &NamedParams) -> Result<Vec<String>, RepoError> {
        self.rows(sql, params)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>(0).map_err(RepoError::from))
            .collect()
    }

    async fn fetch_count(&self, sql: &str, params: &NamedParams) -> Result<i64, RepoError> {
        let rows = self.rows(sql, params).await?;
        let row = rows.first().ok_or_else(|| RepoError::Other {
            message: Cow::Borrowed("count query returned no rows"),
        })?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}

fn bind_value<'q>(query: Query<'q, Postgres, PgArguments>, value: SqlValue) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(flag) => query.bind(flag),
        SqlValue::Int(number) => query.bind(number),
        SqlValue::Float(number) => query.bind(number),
        SqlValue::Text(text) => query.bind(text),
        SqlValue::Timestamp(ts) => query.bind(ts),
        SqlValue::Date(date) => query.bind(date),
        // Only reachable for lists nested in lists; bound as a text array.
        SqlValue::List(items) => query.bind(items.iter().filter_map(SqlValue::to_key).collect::<Vec<_>>()),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Row {
        id: String,
        is_deleted: bool,
    }

    #[test]
    fn json_mapper_deserializes_rows() {
        let row: Row = JsonRowMapper
            .map_row(&json!({ "id": "F-1", "isDeleted": false }))
            .expect("maps");
        assert_eq!(
            row,
            Row {
                id: "F-1".into(),
                is_deleted: false
            }
        );
    }

    #[test]
    fn json_mapper_reports_mapping_errors() {
        let err = RowMapper::<Value, Row>::map_row(&JsonRowMapper, &json!({ "id": 5 })).unwrap_err();
        assert!(matches!(err, RepoError::RowMapping { .. }));
    }

    #[test]
    fn closures_are_row_mappers() {
        let mapper = |row: &Value| -> Result<String, RepoError> { Ok(row["id"].as_str().unwrap_or_default().to_string()) };
        assert_eq!(mapper.map_row(&json!({ "id": "x" })).unwrap(), "x");
    }
}
