use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod parsed;

use parsed::ParsedEntity;

/// Derive `civicdb::types::QueryEntity`.
///
/// Container attributes:
/// - `#[query(table = "household")]` names the target table.
/// - `#[query(rename_all = "camelCase")]` renames every column (`camelCase`,
///   `snake_case`, `PascalCase` or `lowercase`).
///
/// Field attributes:
/// - `#[query(key)]` marks a column used to target rows in `UPDATE ... WHERE`.
/// - `#[query(column = "...")]` overrides the column name.
/// - `#[query(skip)]` leaves the field out entirely.
///
/// Each field's shape follows its type. A non-optional number, `bool` or `char`
/// can never be unset and is never bound. `Option<T>` is unset when `None`.
/// `String`, dates and timestamps are scalars. `Vec<String>` binds as an
/// `IN (...)` list and other vectors are ignored. Any other type is a nested
/// entity and must implement `QueryEntity` itself.
#[proc_macro_derive(QueryEntity, attributes(query))]
pub fn derive_query_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ParsedEntity::from_input(&input) {
        Ok(parsed) => parsed.emit().into(),
        Err(err) => err.to_compile_error().into(),
    }
}
