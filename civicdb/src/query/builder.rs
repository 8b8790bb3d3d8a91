use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;

use super::{NamedParams, generate_clause, is_key, is_not_null, schema::SCHEMA_PLACEHOLDER, select_fields};
use crate::{errors::QueryBuilderError, types::QueryEntity};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles"));

/// A generated statement together with the values for its `:name` markers.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: NamedParams,
    /// Number of tokens that ended up in the `WHERE` clause.
    pub where_tokens: usize,
}

impl BuiltQuery {
    pub fn has_where(&self) -> bool {
        self.where_tokens > 0
    }
}

/// Reject anything that is not a bare identifier before it is spliced into SQL.
pub fn ensure_identifier(identifier: &str) -> Result<(), QueryBuilderError> {
    if IDENTIFIER.is_match(identifier) {
        Ok(())
    } else {
        Err(QueryBuilderError::InvalidIdentifier {
            identifier: identifier.to_string(),
        })
    }
}

/// `table` or `schema.table`; the `{schema}` placeholder is accepted as a schema.
pub fn qualified_table(schema: &str, table: &str) -> Result<String, QueryBuilderError> {
    ensure_identifier(table)?;
    if schema.is_empty() {
        return Ok(table.to_string());
    }
    if schema != SCHEMA_PLACEHOLDER {
        ensure_identifier(schema)?;
    }
    Ok(format!("{schema}.{table}"))
}

pub trait QueryBuilder {
    /// Compose a statement for `entity` against an explicit table.
    fn build_for_table<E>(&self, schema: &str, table: &str, entity: &E) -> Result<BuiltQuery, QueryBuilderError>
    where
        E: QueryEntity + ?Sized;

    /// Compose a statement against the entity's declared table inside `schema`.
    fn build_in_schema<E>(&self, schema: &str, entity: &E) -> Result<BuiltQuery, QueryBuilderError>
    where
        E: QueryEntity,
    {
        let table = E::table_name().ok_or(QueryBuilderError::MissingTable {
            entity: std::any::type_name::<E>(),
        })?;
        self.build_for_table(schema, table, entity)
    }

    fn build<E>(&self, entity: &E) -> Result<BuiltQuery, QueryBuilderError>
    where
        E: QueryEntity,
    {
        self.build_in_schema("", entity)
    }
}

/// `SELECT * FROM {table}` filtered by every set field.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectQueryBuilder;

impl SelectQueryBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl QueryBuilder for SelectQueryBuilder {
    fn build_for_table<E>(&self, schema: &str, table: &str, entity: &E) -> Result<BuiltQuery, QueryBuilderError>
    where
        E: QueryEntity + ?Sized,
    {
        let mut params = NamedParams::new();
        let where_fields = select_fields(&entity.query_fields(), is_not_null, &mut params);
        let mut sql = format!("SELECT * FROM {}", qualified_table(schema, table)?);
        sql.push_str(&generate_clause("WHERE", "AND", &where_fields));
        debug!("built select query: {sql}");
        Ok(BuiltQuery {
            sql,
            params,
            where_tokens: where_fields.len(),
        })
    }
}

/// `UPDATE {table} SET <set fields> WHERE <key fields>`.
///
/// No key field means no `WHERE`: the statement then updates every row. That is
/// left to the caller, only a warning is logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateQueryBuilder;

impl UpdateQueryBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl QueryBuilder for UpdateQueryBuilder {
    fn build_for_table<E>(&self, schema: &str, table: &str, entity: &E) -> Result<BuiltQuery, QueryBuilderError>
    where
        E: QueryEntity + ?Sized,
    {
        let fields = entity.query_fields();
        let mut params = NamedParams::new();
        let set_fields = select_fields(&fields, is_not_null, &mut params);
        let where_fields = select_fields(&fields, is_key, &mut params);
        let mut sql = format!("UPDATE {}", qualified_table(schema, table)?);
        sql.push_str(&generate_clause("SET", ",", &set_fields));
        sql.push_str(&generate_clause("WHERE", "AND", &where_fields));
        if where_fields.is_empty() {
            warn!("update on `{table}` has no key fields and will touch every row");
        }
        debug!("built update query: {sql}");
        Ok(BuiltQuery {
            sql,
            params,
            where_tokens: where_fields.len(),
        })
    }
}
