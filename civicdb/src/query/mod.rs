//! # SQL generation from entity self-descriptions
//!
//! Entities describe their own fields through [`QueryEntity`](crate::types::QueryEntity); this module
//! selects the relevant fields, turns them into `SET` / `WHERE` fragments and
//! collects the bound values.
//!
//! | Step | Function | Output |
//! |------|----------|--------|
//! | Select fields | [`select_fields`] | `["name=:name", "tags IN (:tags)"]` |
//! | Join a clause | [`generate_clause`] | `" WHERE name=:name AND tags IN (:tags)"` |
//! | Compose | [`SelectQueryBuilder`], [`UpdateQueryBuilder`] | [`BuiltQuery`] |
//!
//! Tokens use named-parameter markers (`:name`). [`NamedParams::to_positional`]
//! rewrites them into Postgres `$n` placeholders just before execution.

pub mod builder;
pub mod params;
pub mod schema;

pub use builder::{BuiltQuery, QueryBuilder, SelectQueryBuilder, UpdateQueryBuilder};
pub use params::NamedParams;
pub use schema::SchemaResolver;

use crate::types::{FieldValue, QueryField, SqlValue};

/// Decides whether a field takes part in a clause.
pub type FieldPredicate = fn(&QueryField) -> bool;

/// Field carries a value.
pub fn is_not_null(field: &QueryField) -> bool {
    field.is_set()
}

/// Field is marked `#[query(key)]`.
pub fn is_key(field: &QueryField) -> bool {
    field.key
}

/// Bind marker for a single value.
pub fn bind_token(name: &str) -> String {
    format!("{name}=:{name}")
}

/// Bind marker for a list of values.
pub fn bind_list_token(name: &str) -> String {
    format!("{name} IN (:{name})")
}

/// Walk `fields` in declaration order and return the tokens of every field the
/// predicate accepts. Nested entities are flattened in place; primitives are
/// never selected. Selected values are recorded in `params`.
pub fn select_fields(fields: &[QueryField], predicate: FieldPredicate, params: &mut NamedParams) -> Vec<String> {
    let mut tokens = Vec::new();
    for field in fields {
        if field.is_primitive() || !predicate(field) {
            continue;
        }
        match &field.value {
            FieldValue::Primitive => {}
            FieldValue::Scalar(value) => {
                params.insert(field.name, value.clone().unwrap_or(SqlValue::Null));
                tokens.push(bind_token(field.name));
            }
            FieldValue::List(values) => {
                if let Some(values) = values
                    && !values.is_empty()
                {
                    params.insert(field.name, SqlValue::List(values.clone()));
                    tokens.push(bind_list_token(field.name));
                }
            }
            FieldValue::Nested(nested) => {
                if let Some(nested) = nested {
                    tokens.extend(select_fields(nested, predicate, params));
                }
            }
        }
    }
    tokens
}

/// Join tokens into `" {keyword} t0 {separator} t1 ..."`, or `""` when there are none.
pub fn generate_clause(keyword: &str, separator: &str, tokens: &[String]) -> String {
    let Some((first, rest)) = tokens.split_first() else {
        return String::new();
    };
    let mut clause = format!(" {keyword} {first}");
    for token in rest {
        clause.push_str(&format!(" {separator} {token}"));
    }
    clause
}
