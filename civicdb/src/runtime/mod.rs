pub mod executor;
pub mod scripts;

pub use executor::{FromRowMapper, JsonRowMapper, PgExecutor, RowMapper, SqlExecutor};
